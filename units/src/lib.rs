pub mod todo;

pub use uom;
pub use uom::si::Quantity;
pub use uom::si::f64::{Angle, Information, Ratio};

mod units {
  pub use uom::si::{angle      ::{radian, degree, revolution},
                    information::{byte, kibibyte, mebibyte, gibibyte},
                    ratio      ::ratio,
  };
}

// Making values from float literals seems to be very long-winded, so provide
// some pithily-named convenience constructors.

/// Generate a function called NAME which returns QUANTITY by interpreting its
/// argument as UNIT
///
/// wrap!(NAME QUANTITY UNIT);
macro_rules! wrap {
  ($name:ident $quantity:ident $unit:ident ) => {
    pub fn $name(x: f64) -> $quantity { $quantity::new::<units::$unit>(x) }
  };
}

wrap!(radian    Angle          radian);
wrap!(degree    Angle          degree);
wrap!(turn      Angle      revolution);
wrap!(ratio     Ratio           ratio);
wrap!(bytes     Information      byte);
wrap!(kibibytes Information  kibibyte);
wrap!(mebibytes Information  mebibyte);
wrap!(gibibytes Information  gibibyte);

// Reverse direction of the above.
pub fn radian_(x: Angle      ) -> f64 { x.get::<units::radian>    () }
pub fn degree_(x: Angle      ) -> f64 { x.get::<units::degree>    () }
pub fn turn_  (x: Angle      ) -> f64 { x.get::<units::revolution>() }
pub fn ratio_ (x: Ratio      ) -> f64 { x.get::<units::ratio>     () }
pub fn bytes_ (x: Information) -> f64 { x.get::<units::byte>      () }

/// The full circle constant (τ) Equal to 2π.
pub const TWOPI: f64 = std::f64::consts::TAU;

#[macro_export]
macro_rules! assert_uom_eq {
  ($unit:ident, $lhs:expr, $rhs:expr, $algo:ident <= $tol:expr) => {
    float_eq::assert_float_eq!($lhs.get::<$unit>(), $rhs.get::<$unit>(), $algo <= $tol)
  };
}

#[cfg(test)]
mod tests {
  use super::*;
  use super::units::{degree as deg, byte};

  #[test]
  fn quarter_turn() {
    assert_uom_eq!(deg, turn(0.25), degree(90.0), r2nd <= 1e-12);
    assert_uom_eq!(deg, radian(TWOPI / 4.0), degree(90.0), r2nd <= 1e-12);
  }

  #[test]
  fn binary_prefixes() {
    assert_eq!(bytes_(kibibytes(1.0)), 1024.0);
    assert_uom_eq!(byte, gibibytes(2.0), mebibytes(2048.0), ulps <= 1);
  }

  // Memory budgets are written with their units in config files
  #[test]
  fn parse_information_with_units() -> Result<(), Box<dyn std::error::Error>> {
    let m: Information = "4 GiB".parse()?;
    assert_eq!(bytes_(m), 4.0 * 1024.0 * 1024.0 * 1024.0);
    let m: Information = "512 B".parse()?;
    assert_eq!(bytes_(m), 512.0);
    Ok(())
  }
}

//! A fixed number of concurrent execution streams, each with its own scratch
//! buffers.
//!
//! Work is handed out round-robin: the `i`th task goes to stream
//! `i % num_streams`, and each stream works through its tasks in order.
//! `dispatch` returns only once every stream has finished, so tasks must not
//! depend on each other, but may freely use their stream's state.

use rayon::{ThreadPool, ThreadPoolBuilder};

use units::todo::{Intensityf64, Weightf64};

use crate::error::Result;
use crate::partition::stream_of;

/// Scratch and accumulation buffers private to one stream
#[derive(Clone, Debug)]
pub struct StreamState {
    /// One value per detector pixel
    pub view: Vec<Intensityf64>,
    /// Partial back-projection into the model
    pub model: Vec<Intensityf64>,
    /// Partial interpolation weights
    pub weights: Vec<Weightf64>,
}

pub struct Streams {
    pool: ThreadPool,
    states: Vec<StreamState>,
}

impl Streams {

    pub fn new(num_streams: usize, num_pix: usize, model_len: usize) -> Result<Self> {
        let num_streams = num_streams.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_streams)
            .thread_name(|i| format!("emc-stream-{i}"))
            .build()?;
        let state = StreamState {
            view   : vec![0.0; num_pix],
            model  : vec![0.0; model_len],
            weights: vec![0.0; model_len],
        };
        Ok(Self { pool, states: vec![state; num_streams] })
    }

    pub fn len(&self) -> usize { self.states.len() }
    pub fn is_empty(&self) -> bool { self.states.is_empty() }

    /// Forget everything accumulated so far
    pub fn zero_accumulators(&mut self) {
        for s in &mut self.states {
            s.model  .fill(0.0);
            s.weights.fill(0.0);
        }
    }

    /// Apply `work` to every task, on the stream chosen by the task's position
    pub fn dispatch<T, F>(&mut self, tasks: impl IntoIterator<Item = T>, work: F)
    where
        T: Send,
        F: Fn(&mut StreamState, T) + Sync,
    {
        let n = self.states.len();
        let mut queues: Vec<Vec<T>> = (0..n).map(|_| vec![]).collect();
        for (position, task) in tasks.into_iter().enumerate() {
            queues[stream_of(position, n)].push(task);
        }
        let work = &work;
        let states = &mut self.states;
        self.pool.scope(|scope| {
            for (state, queue) in states.iter_mut().zip(queues) {
                scope.spawn(move |_| for task in queue { work(state, task) });
            }
        });
    }

    /// Add every stream's partial accumulators to `model` and `weights`, in
    /// stream order
    pub fn accumulate_into(&self, model: &mut [Intensityf64], weights: &mut [Weightf64]) {
        for s in &self.states {
            model  .iter_mut().zip(&s.model  ).for_each(|(m, x)| *m += x);
            weights.iter_mut().zip(&s.weights).for_each(|(w, x)| *w += x);
        }
    }
}

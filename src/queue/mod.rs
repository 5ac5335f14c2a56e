//! FIFO message queue over a shared store list.

mod fifo;

pub use fifo::FifoQueue;

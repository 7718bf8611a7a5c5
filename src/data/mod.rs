//! Data path: hand-off channels, the ring buffer, reducers and their live
//! reconfiguration.
pub mod channel;
pub mod reconfig;
pub mod reducer;
pub mod ring_buffer;

pub use channel::BoundedChannel;
pub use reconfig::{ReconfigMessage, ReconfigReceiver, ReconfigSender, Tunable};
pub use reducer::{Reducer, ReducerConfig, ReducerKind};
pub use ring_buffer::{BufferPhase, RingBuffer};

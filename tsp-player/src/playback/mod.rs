//! Streaming playback: render queue, real-time render loop, and the
//! control-side stream controller

pub mod controller;
pub mod queue;
pub mod render;
pub mod ring_buffer;
pub mod state;
pub mod tickets;

pub use controller::{InitStatus, StreamController};
pub use render::{LevelMeter, RenderLoop};
pub use ring_buffer::{render_channel, RenderCommand};
pub use state::StreamState;
pub use tickets::{MediaTicket, TicketId};

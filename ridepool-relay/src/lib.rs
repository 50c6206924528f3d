pub mod channels;
pub mod relay;

pub use channels::{ChannelRegistry, Subscription};
pub use relay::LocationRelay;

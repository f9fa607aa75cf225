pub mod blueprint;
pub mod block;
pub mod enums;
pub mod generated;
pub mod paper;
pub mod question;
pub mod session;

pub use blueprint::*;
pub use block::*;
pub use enums::*;
pub use generated::*;
pub use paper::*;
pub use question::*;
pub use session::*;

mod connect_race;
mod socket;
mod timeout;
mod validator;

pub use connect_race::*;
pub use socket::*;
pub use timeout::*;
pub use validator::*;

pub mod parser;
mod socket_address;

pub use parser::{format, is_ip_literal, parse, parse_ip_literal};
pub use socket_address::*;

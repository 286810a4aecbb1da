//! Counter protocol implementation.
//!
//! A line-oriented text protocol over one shared signed 64-bit counter:
//! - Client sends: `OUTPUT\r\n`
//! - Server replies to that client only with the current value
//!
//! - Client sends: `INCR <n>\r\n` or `DECR <n>\r\n`
//! - Server applies the delta and broadcasts the new value to every
//!   connected client, the sender included
//!
//! Replies are the bare decimal value with no line terminator. Lines that
//! match none of the commands are ignored without a reply.
//!
//! ## Protocol Format
//!
//! ```text
//! Request:  INCR 5\r\n
//! Broadcast: 5
//!
//! Request:  DECR 2\r\n
//! Broadcast: 3
//!
//! Request:  OUTPUT\r\n
//! Response: 3
//! ```

pub mod handler;
pub mod parser;

pub use handler::handle_line;

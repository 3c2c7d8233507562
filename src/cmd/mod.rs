//! CLI command implementations.
//!
//! | Module   | Commands handled                                 |
//! |----------|--------------------------------------------------|
//! | `serve`  | `Serve`                                          |
//! | `admin`  | `Init`, `Project`, `State`, `User`, `Maintainer`, `Person` |

pub mod admin;
pub mod serve;

pub use admin::{cmd_init, cmd_maintainer, cmd_person, cmd_project, cmd_state, cmd_user};
pub use serve::cmd_serve;

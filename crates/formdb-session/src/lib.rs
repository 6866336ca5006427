//! Parent/child cascades and operation dispatch for formdb.
//!
//! A [`Form`] is a schema together with the child forms linked to it. Every
//! write on a form cascades down its links inside the caller's transaction:
//!
//! - **Insert/update/save**: row-count bounds are checked for the whole tree
//!   first, then the parent is written, its linking values are copied into
//!   each child row and the children are upserted.
//! - **Read**: the parent is read by key, then each link is filled from a
//!   child filter on the linking columns.
//! - **Delete**: the parent must exist; each link's children are deleted
//!   (grandchildren before their own parents) and the parent row goes last.
//!
//! [`serve`] sits on top and maps a client operation and JSON payload onto
//! these cascades.
//!
//! # Example
//!
//! ```ignore
//! let lines = Form::builder(&line_schema).build()?;
//! let order = Form::builder(&order_schema)
//!     .link(LinkDescriptor::tabular("lines").on("id", "orderId").rows(1, 50), &lines)
//!     .build()?;
//!
//! let outcome = serve(&order, Operation::Create, &handle, &caller, &payload)?;
//! ```

pub mod form;
pub mod link;
pub mod operation;

pub use form::{ChildData, Form, FormBuilder, FormData};
pub use link::{LinkDescriptor, LinkKind, ResolvedLink};
pub use operation::{Outcome, serve};

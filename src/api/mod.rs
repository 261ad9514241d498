//! Service layer for memberdb
//!
//! [`MemberService`] is the surface consumed by the HTTP layer. Every
//! operation is also reachable as a JSON request through
//! [`MemberService::handle_json`].
//!
//! # Supported Operations
//!
//! - resolve_tenant, count_members, find_members, find_member_by_id,
//!   update_member_by_id
//! - list_field_descriptors, add_field, update_field, rename_field,
//!   delete_field, set_field_visibility
//! - discover_fields, flatten_legacy_fields, metrics

mod errors;
mod handler;
mod request;
mod response;
mod service;

pub use errors::{ServiceError, ServiceResult};
pub use request::{FindMembersRequest, MemberPatch, PageRequest, Request, MAX_PAGE_LIMIT};
pub use response::{ErrorResponse, LocatedMember, MemberPage, Response, SuccessResponse};
pub use service::MemberService;

//! JSON request dispatch
//!
//! Turns a parsed [`Request`] into a call on [`MemberService`] and the
//! result into a [`Response`]. Errors never escape: every failure becomes
//! an error response carrying its code.

use serde::Serialize;

use super::errors::ServiceResult;
use super::request::Request;
use super::response::Response;
use super::service::MemberService;

fn respond<T: Serialize>(result: ServiceResult<T>) -> Response {
    match result {
        Ok(data) => Response::success(&data),
        Err(err) => Response::error(&err),
    }
}

impl MemberService {
    /// Handle a raw JSON request string
    pub async fn handle_json(&self, json_request: &str) -> String {
        let response = match Request::parse(json_request) {
            Ok(request) => self.handle(request).await,
            Err(err) => Response::error(&err),
        };
        response.to_json()
    }

    /// Handle a parsed request
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::ResolveTenant { tenant } => respond(self.resolve_tenant(&tenant).await),
            Request::CountMembers { tenant, filter } => {
                respond(self.count_members(tenant.as_ref(), &filter).await)
            }
            Request::FindMembers(find) => respond(self.find_members(&find).await),
            Request::FindMemberById { id } => respond(self.find_member_by_id(&id).await),
            Request::UpdateMemberById { id, patch } => {
                respond(self.update_member_by_id(&id, &patch).await)
            }
            Request::ListFieldDescriptors => respond(self.list_field_descriptors().await),
            Request::AddField { field } => respond(self.add_field(field).await),
            Request::UpdateField { name, patch } => respond(self.update_field(&name, patch).await),
            Request::RenameField { from, to } => respond(self.rename_field(&from, &to).await),
            Request::DeleteField { name } => respond(self.delete_field(&name).await),
            Request::SetFieldVisibility { name, visible } => {
                respond(self.set_field_visibility(&name, visible).await)
            }
            Request::DiscoverFields { sample_size } => {
                respond(self.discover_fields_from_sample(sample_size).await)
            }
            Request::FlattenLegacyFields => respond(self.flatten_legacy_fields().await),
            Request::Metrics => Response::success(&self.metrics()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::service::tests::{member, service_over};
    use serde_json::{json, Value as JsonValue};

    fn parse(raw: &str) -> JsonValue {
        serde_json::from_str(raw).unwrap()
    }

    #[tokio::test]
    async fn test_count_request() {
        let (service, _) = service_over(vec![
            vec![member("a", json!({"gender": "Male"}))],
            vec![member("b", json!({"gender": "Male"})), member("c", json!({}))],
        ]);
        let out = parse(
            &service
                .handle_json(r#"{"op": "count_members", "filter": {"gender": "Male"}}"#)
                .await,
        );
        assert_eq!(out, json!({"status": "ok", "data": 2}));
    }

    #[tokio::test]
    async fn test_error_carries_code() {
        let (service, _) = service_over(vec![vec![]]);
        let out = parse(
            &service
                .handle_json(r#"{"op": "add_field", "field": {"name": "9lives", "type": "String"}}"#)
                .await,
        );
        assert_eq!(out["status"], json!("error"));
        assert_eq!(out["code"], json!("MEMBERDB_INVALID_FIELD_NAME"));
        assert_eq!(out["http_status"], json!(400));

        let out = parse(&service.handle_json("not json").await);
        assert_eq!(out["code"], json!("MEMBERDB_INVALID_REQUEST"));
    }

    #[tokio::test]
    async fn test_rename_request() {
        let (service, _) = service_over(vec![vec![member("a", json!({"mobile": "98400"}))]]);
        let out = parse(
            &service
                .handle_json(r#"{"op": "rename_field", "from": "mobile", "to": "phone"}"#)
                .await,
        );
        assert_eq!(out["status"], json!("ok"));
        assert_eq!(out["data"]["outcome"], json!("renamed"));
        assert_eq!(out["data"]["detail"]["renamed"], json!(1));
    }

    #[tokio::test]
    async fn test_metrics_request() {
        let (service, _) = service_over(vec![vec![], vec![]]);
        service.handle_json(r#"{"op": "count_members"}"#).await;
        let out = parse(&service.handle_json(r#"{"op": "metrics"}"#).await);
        assert_eq!(out["data"]["fanout_calls"], json!(1));
    }
}

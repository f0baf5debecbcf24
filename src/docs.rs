use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes::{authz, health};

#[derive(OpenApi)]
#[openapi(
	paths(
		health::health,
		authz::list_scopes,
		authz::check_scope,
		authz::check_languages,
		authz::filter_viewable_languages,
		authz::check_keys,
		authz::check_api_key_scopes
	),
	components(
		schemas(
			models::Scope,
			models::PermissionType,
			models::LanguagePermissionKind,
			health::HealthResponse,
			authz::ScopesResponse,
			authz::ScopeCheckRequest,
			authz::LanguageCheckRequest,
			authz::LanguageTags,
			authz::KeyCheckRequest,
			authz::ApiKeyScopesRequest
		)
	),
	tags(
		(name = "Health", description = "Liveness and database reachability"),
		(name = "Authorization", description = "Project permission checks for the calling principal")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16, api_key_header: &str) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	ensure_security_components(&mut doc, api_key_header);
	ensure_global_security(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	// serve the post-processed JSON rather than letting SwaggerUi re-serialize it
	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn ensure_security_components(doc: &mut Value, api_key_header: &str) {
	let schemes = &mut doc["components"]["securitySchemes"];

	schemes["bearerAuth"] = json!({
		"type": "http",
		"scheme": "bearer",
		"bearerFormat": "JWT"
	});
	schemes["apiKey"] = json!({
		"type": "apiKey",
		"in": "header",
		"name": api_key_header
	});
}

fn ensure_global_security(doc: &mut Value) {
	if doc.get("security").is_none() {
		doc["security"] = json!([{ "bearerAuth": [] }, { "apiKey": [] }]);
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{}", port);

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn document_lists_authz_routes_and_both_schemes() {
		let doc = build_openapi(8000, "X-API-Key").unwrap();
		let value = serde_json::to_value(&doc).unwrap();

		let paths = value["paths"].as_object().unwrap();
		assert!(paths.contains_key("/api/health"));
		assert!(paths.contains_key("/v2/projects/{project_id}/authz/scope"));
		assert!(paths.contains_key("/v2/projects/{project_id}/authz/languages/viewable"));

		let schemes = &value["components"]["securitySchemes"];
		assert_eq!(schemes["apiKey"]["name"], "X-API-Key");
		assert_eq!(schemes["bearerAuth"]["scheme"], "bearer");
		assert_eq!(value["servers"][0]["url"], "http://localhost:8000");
	}
}

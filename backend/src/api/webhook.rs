use log::info;
use rocket::{get, post};
use serde_json::Value;

/// Gumroad pings both verbs while validating a webhook URL, so both accept
/// anything and answer "OK". Payloads are only logged for now.
#[get("/gumroad-webhook")]
pub fn gumroad_webhook_ping() -> &'static str {
    info!("Gumroad webhook ping received");
    "OK"
}

#[post("/gumroad-webhook", data = "<payload>")]
pub fn gumroad_webhook(payload: String) -> &'static str {
    match serde_json::from_str::<Value>(&payload) {
        Ok(parsed) => {
            let pretty =
                serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| parsed.to_string());
            info!("Gumroad webhook payload:\n{pretty}");
        }
        Err(_) => info!("Gumroad webhook payload (raw): {payload}"),
    }
    "OK"
}

//! Quick-start examples for printstream.
//!
//! Run with:
//!   PRINTMAIL_API_KEY=test_sk_... STREAMING_API_KEY=... cargo run --example quickstart

use printstream::{Client, ErrorKind, ListResponse, RequestOptions, Resource, Service};
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> printstream::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Print/mail client from the environment
    // -----------------------------------------------------------------------
    let mail = Client::from_env(Service::PrintMail)?;

    // -----------------------------------------------------------------------
    // 2. Typed listing with pagination parameters
    // -----------------------------------------------------------------------
    let opts = RequestOptions::new().query("limit", "10").query("skip", "0");
    let page: ListResponse<Resource> = mail
        .send(printstream::Method::GET, "/postcards", opts)
        .await?;
    println!("{} of {} postcards", page.len(), page.total_count);
    for postcard in &page {
        println!("  {} (created {})", postcard.id, postcard.created_at);
    }
    println!();

    // -----------------------------------------------------------------------
    // 3. Branch on the error kind
    // -----------------------------------------------------------------------
    let body = json!({ "to": "contact_missing", "size": "6x4" });
    match mail.post::<Value, _>("/postcards", &body).await {
        Ok(created) => println!("Created {}", created["id"]),
        Err(e) => match e.as_api() {
            Some(api) if api.kind() == ErrorKind::Validation => {
                println!("Rejected: {} ({:?})", api.message(), api.details());
            }
            Some(api) if api.is_rate_limited() => {
                println!("Still rate limited after retries, back off upstream");
            }
            _ => return Err(e),
        },
    }
    println!();

    // -----------------------------------------------------------------------
    // 4. Streaming-avatar client, released explicitly
    // -----------------------------------------------------------------------
    let streaming = Client::from_env(Service::StreamingAvatar)?;
    let session: Value = streaming
        .post("/streaming.new", &json!({ "quality": "medium" }))
        .await?;
    let session_id = session["data"]["session_id"].as_str().unwrap_or_default();
    println!("Session {session_id} started");

    let _: Option<Value> = streaming
        .post("/streaming.stop", &json!({ "session_id": session_id }))
        .await?;
    streaming.close();

    Ok(())
}

//! Server-Sent Events framing
//!
//! ```text
//! id: 42
//! event: frame
//! data: {"type":"frame","session_id":"arm_1-1700000000000",...}
//!
//! ```

use crate::relay::Delivery;

/// Response head opening an event stream
pub const STREAM_HEADERS: &str = "HTTP/1.1 200 OK\r\n\
Content-Type: text/event-stream\r\n\
Cache-Control: no-cache\r\n\
Connection: keep-alive\r\n\
Access-Control-Allow-Origin: *\r\n\
\r\n";

/// Comment line keeping idle connections open through proxies
pub const KEEPALIVE: &str = ": keepalive\n\n";

/// Encode one delivery as an SSE event
pub fn format_event(delivery: &Delivery) -> Result<String, serde_json::Error> {
    let data = serde_json::to_string(delivery.event.as_ref())?;
    Ok(format!(
        "id: {}\nevent: {}\ndata: {}\n\n",
        delivery.index,
        delivery.event.name(),
        data
    ))
}

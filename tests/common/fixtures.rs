//! Media payloads and mock endpoints

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Stand-in for a small video file
pub const VIDEO_BYTES: &[u8] = b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00mp42isom";

/// Stand-in for a small image file
pub const IMAGE_BYTES: &[u8] = b"\xff\xd8\xff\xe0\x00\x10JFIF\x00";

/// Serve `body` at `route`, expecting exactly `times` requests
pub async fn mount_media(server: &MockServer, route: &str, body: &[u8], times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .expect(times)
        .mount(server)
        .await;
}

/// Answer `route` with `status` forever
pub async fn mount_failure(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

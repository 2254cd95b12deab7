use std::{
    io::{BufRead, BufReader, Read, Write},
    net::{SocketAddr, TcpStream},
    sync::Arc,
    thread,
};

use indoc::indoc;
use pingpong::{AdmissionGate, PingPong, Server};

fn start(app: PingPong) -> SocketAddr {
    let server = Server::builder()
        .max_threads(8)
        .try_bind("127.0.0.1:0")
        .unwrap();
    let addr = server.local_addr().unwrap();

    thread::spawn(move || server.serve(app));

    addr
}

fn start_with_threshold(threshold: u64) -> SocketAddr {
    start(PingPong::new(Arc::new(AdmissionGate::new(threshold))))
}

fn crlf(raw: &str) -> String {
    raw.replace('\n', "\r\n")
}

fn exchange(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(raw.as_bytes()).unwrap();

    let mut res = String::new();
    stream.read_to_string(&mut res).unwrap();
    res
}

fn request(addr: SocketAddr, method: &str, body: &str) -> String {
    let raw = format!(
        "{method} / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    exchange(addr, &raw)
}

fn status_line(res: &str) -> &str {
    res.lines().next().unwrap_or_default()
}

fn body(res: &str) -> &str {
    res.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or_default()
}

#[test]
fn get_is_served_until_the_threshold() {
    let addr = start_with_threshold(2);

    for _ in 0..2 {
        let res = request(addr, "GET", "");
        assert_eq!(status_line(&res), "HTTP/1.1 200 OK");
        assert_eq!(
            body(&res),
            r#"{"ping":"pong","message":"Successful GET request"}"#
        );
    }

    let res = request(addr, "GET", "");
    assert_eq!(status_line(&res), "HTTP/1.1 429 Too Many Requests");
    assert!(res.contains("content-type: text/plain\r\n"));
    assert_eq!(body(&res), "Too many requests");
}

#[test]
fn post_validates_the_body() {
    let addr = start_with_threshold(100);

    let res = request(addr, "POST", r#"{"hello":"world"}"#);
    assert_eq!(status_line(&res), "HTTP/1.1 200 OK");
    assert!(res.contains("content-type: application/json\r\n"));
    assert_eq!(
        body(&res),
        r#"{"ping":"pong","message":"Successful POST request"}"#
    );

    let res = request(addr, "POST", r#"{"hello":"moon"}"#);
    assert_eq!(status_line(&res), "HTTP/1.1 400 Bad Request");
    assert_eq!(body(&res), r#"{"errorMessage":"Invalid Request"}"#);
}

#[test]
fn put_patch_delete_always_succeed() {
    let addr = start_with_threshold(0);

    for method in ["PUT", "PATCH", "DELETE"] {
        let res = request(addr, method, r#"{"id":1}"#);
        assert_eq!(status_line(&res), "HTTP/1.1 200 OK");
        assert_eq!(
            body(&res),
            format!(r#"{{"ping":"pong","message":"Successful {method} request"}}"#)
        );
    }
}

#[test]
fn malformed_json_is_a_bad_request() {
    let addr = start_with_threshold(100);

    let res = request(addr, "PATCH", "{oops");

    assert_eq!(status_line(&res), "HTTP/1.1 400 Bad Request");
    assert_eq!(body(&res), r#"{"errorMessage":"Malformed Request Body"}"#);
}

#[test]
fn other_methods_are_not_allowed() {
    let addr = start_with_threshold(100);

    let res = request(addr, "OPTIONS", "");

    assert_eq!(status_line(&res), "HTTP/1.1 405 Method Not Allowed");
    assert!(res.contains("allow: GET, POST, PUT, PATCH, DELETE\r\n"));
    assert_eq!(body(&res), r#"{"errorMessage":"Method Not Allowed"}"#);
}

#[test]
fn garbage_gets_a_bad_request() {
    let addr = start_with_threshold(100);

    let res = exchange(addr, "NOT HTTP AT ALL\r\n\r\n");

    assert_eq!(status_line(&res), "HTTP/1.1 400 Bad Request");
}

#[test]
fn pipelined_requests_are_answered_in_order() {
    let addr = start_with_threshold(100);

    let raw = crlf(indoc! {r#"
        PUT /first HTTP/1.1
        Host: localhost
        Content-Length: 2

        {}GET /second HTTP/1.1
        Host: localhost

        DELETE /third HTTP/1.1
        Host: localhost
        Connection: close
        Content-Length: 4

        null"#});

    let res = exchange(addr, &raw);

    let put = res.find("Successful PUT request").unwrap();
    let get = res.find("Successful GET request").unwrap();
    let delete = res.find("Successful DELETE request").unwrap();
    assert!(put < get && get < delete);
    assert_eq!(res.matches("HTTP/1.1 200 OK").count(), 3);
}

#[test]
fn chunked_request_bodies_are_read() {
    let addr = start_with_threshold(100);

    let raw = crlf(indoc! {r#"
        POST / HTTP/1.1
        Host: localhost
        Connection: close
        Transfer-Encoding: chunked

        8
        {"hello"
        9
        :"world"}
        0

    "#});

    let res = exchange(addr, &raw);

    assert_eq!(status_line(&res), "HTTP/1.1 200 OK");
    assert!(body(&res).contains("Successful POST request"));
}

#[test]
fn http_10_connections_close_after_one_response() {
    let addr = start_with_threshold(100);

    let res = exchange(addr, "GET / HTTP/1.0\r\n\r\n");

    assert_eq!(status_line(&res), "HTTP/1.0 200 OK");
    assert!(res.contains("connection: close\r\n"));
}

#[test]
fn expect_continue_is_honoured() {
    let addr = start_with_threshold(100);
    let payload = r#"{"hello":"world"}"#;

    let mut stream = TcpStream::connect(addr).unwrap();
    write!(
        stream,
        "POST / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nExpect: 100-continue\r\nContent-Length: {}\r\n\r\n",
        payload.len()
    )
    .unwrap();

    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert_eq!(line, "HTTP/1.1 100 Continue\r\n");
    line.clear();
    reader.read_line(&mut line).unwrap();
    assert_eq!(line, "\r\n");

    stream.write_all(payload.as_bytes()).unwrap();

    let mut res = String::new();
    reader.read_to_string(&mut res).unwrap();
    assert_eq!(status_line(&res), "HTTP/1.1 200 OK");
}

#[test]
fn expect_continue_refuses_oversized_bodies() {
    let app = PingPong::new(Arc::new(AdmissionGate::new(100))).max_body_bytes(16);
    let addr = start(app);

    let res = exchange(
        addr,
        "PUT / HTTP/1.1\r\nHost: localhost\r\nExpect: 100-continue\r\nContent-Length: 4096\r\n\r\n",
    );

    assert_eq!(status_line(&res), "HTTP/1.1 417 Expectation Failed");
}

#[test]
fn concurrent_gets_admit_exactly_the_threshold() {
    let addr = start_with_threshold(20);

    let handles = (0..30)
        .map(|_| thread::spawn(move || request(addr, "GET", "")))
        .collect::<Vec<_>>();

    let statuses = handles
        .into_iter()
        .map(|handle| status_line(&handle.join().unwrap()).to_owned())
        .collect::<Vec<_>>();

    let served = statuses.iter().filter(|s| *s == "HTTP/1.1 200 OK").count();
    let rejected = statuses
        .iter()
        .filter(|s| *s == "HTTP/1.1 429 Too Many Requests")
        .count();

    assert_eq!(served, 20);
    assert_eq!(rejected, 10);
}

#[test]
fn head_requests_get_no_body() {
    let addr = start_with_threshold(100);

    let res = exchange(addr, "HEAD / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");

    assert_eq!(status_line(&res), "HTTP/1.1 405 Method Not Allowed");
    assert!(res.ends_with("\r\n\r\n"));
    assert_eq!(body(&res), "");
}

#[test]
fn oversized_chunked_bodies_end_the_connection() {
    let app = PingPong::new(Arc::new(AdmissionGate::new(100))).max_body_bytes(8);
    let addr = start(app);

    let raw = crlf(indoc! {r#"
        PUT / HTTP/1.1
        Host: localhost
        Transfer-Encoding: chunked

        f
        {"id":"abcdef"}
        0

        GET / HTTP/1.1
        Host: localhost
        Connection: close

    "#});

    let res = exchange(addr, &raw);

    assert_eq!(status_line(&res), "HTTP/1.1 413 Payload Too Large");
    assert!(res.contains("connection: close\r\n"));
    assert_eq!(body(&res), r#"{"errorMessage":"Payload Too Large"}"#);
    assert_eq!(res.matches("HTTP/1.1 ").count(), 1);
}

#[test]
fn absurd_chunk_sizes_are_refused() {
    let app = PingPong::new(Arc::new(AdmissionGate::new(100))).max_body_bytes(16);
    let addr = start(app);

    let raw = format!(
        "PUT / HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\nfffffffffff\r\n{}",
        "a".repeat(64)
    );

    let res = exchange(addr, &raw);

    assert_eq!(status_line(&res), "HTTP/1.1 413 Payload Too Large");
    assert!(res.contains("connection: close\r\n"));

    let res = request(addr, "GET", "");
    assert_eq!(status_line(&res), "HTTP/1.1 200 OK");
}

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use actionhttp::request_parser::RequestParser;

fn parse_all(bytes: &[u8]) -> usize {
    let mut parser = RequestParser::parser_for(bytes).unwrap();
    let mut count = 0;
    while parser.full_request().is_some() {
        count += 1;
    }
    count
}

fn simple_request_parse_benchmark(c: &mut Criterion) {
    let request = b"GET / HTTP/1.1\r\nHost: localhost:7878\r\nUser-Agent: Test\r\n\r\n";

    c.bench_function("simple_request_parse", |b| {
        b.iter(|| parse_all(black_box(request)));
    });
}

fn complex_request_parse_benchmark(c: &mut Criterion) {
    let request = b"GET /path/to/resource?id=123&name=test HTTP/1.1\r\n\
                    Host: localhost:7878\r\n\
                    User-Agent: Mozilla/5.0 (Windows NT 10.0; Win64; x64)\r\n\
                    Accept: text/html,application/xhtml+xml\r\n\
                    Accept-Language: en-US,en;q=0.9\r\n\
                    Accept-Encoding: gzip, deflate, br\r\n\
                    Connection: keep-alive\r\n\
                    Upgrade-Insecure-Requests: 1\r\n\
                    \r\n";

    c.bench_function("complex_request_parse", |b| {
        b.iter(|| parse_all(black_box(request)));
    });
}

fn request_parse_with_body_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse_body");

    for size in [16, 1024, 16 * 1024].iter() {
        let body = "x".repeat(*size);
        let request = format!(
            "POST /items HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        group.bench_with_input(BenchmarkId::from_parameter(size), &request, |b, request| {
            b.iter(|| parse_all(black_box(request.as_bytes())));
        });
    }

    group.finish();
}

fn request_parse_fragmented_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse_fragmented");
    let request = b"POST /users/42/orders HTTP/1.1\r\nHost: localhost\r\nContent-Length: 27\r\n\r\n{\"item\":\"pen\",\"quantity\":3}";

    for chunk in [1, 8, 64].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(chunk), chunk, |b, &chunk| {
            b.iter(|| {
                let mut parser = RequestParser::new();
                for piece in request.chunks(chunk) {
                    parser.parse_next(black_box(piece)).unwrap();
                }
                parser.full_request().unwrap()
            });
        });
    }

    group.finish();
}

fn request_parse_pipelined_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse_pipelined");

    for count in [10, 100, 1000].iter() {
        let request = "GET / HTTP/1.1\r\nHost: localhost\r\nUser-Agent: Test\r\n\r\n".repeat(*count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &request, |b, request| {
            b.iter(|| parse_all(black_box(request.as_bytes())));
        });
    }

    group.finish();
}

fn request_case_insensitive_headers_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_case_insensitive");

    let requests = [
        ("lowercase", b"get / HTTP/1.1\r\nhost: localhost\r\nuser-agent: Test\r\naccept-encoding: gzip\r\n\r\n".as_slice()),
        ("uppercase", b"GET / HTTP/1.1\r\nHOST: localhost\r\nUSER-AGENT: Test\r\nACCEPT-ENCODING: gzip\r\n\r\n".as_slice()),
        ("mixed", b"Get / HTTP/1.1\r\nHost: localhost\r\nUser-Agent: Test\r\nAccept-Encoding: gzip\r\n\r\n".as_slice()),
    ];

    for (name, request) in requests.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), request, |b, request| {
            b.iter(|| parse_all(black_box(request)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    simple_request_parse_benchmark,
    complex_request_parse_benchmark,
    request_parse_with_body_benchmark,
    request_parse_fragmented_benchmark,
    request_parse_pipelined_benchmark,
    request_case_insensitive_headers_benchmark
);
criterion_main!(benches);

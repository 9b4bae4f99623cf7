use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chatbridge_rs::stream::{JsonSseDecoder, TokenLineDecoder, UpstreamEvent};

fn token_line_sample() -> String {
    let mut out = String::new();
    for i in 0..256 {
        out.push_str("0:\"token ");
        out.push_str(&i.to_string());
        out.push_str(" of a moderately long answer\"\n");
    }
    out.push_str("e:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":120,\"completionTokens\":256}}\n");
    out
}

fn json_sse_sample() -> String {
    let mut out = String::new();
    for i in 0..256 {
        out.push_str("data: {\"choices\":[{\"delta\":{\"content\":\"token ");
        out.push_str(&i.to_string());
        out.push_str(" of a moderately long answer\"}}]}\n\n");
    }
    out.push_str("data: {\"choices\":[{\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":120,\"completion_tokens\":256}}\n\n");
    out
}

fn bench_token_line_decode(c: &mut Criterion) {
    let input = token_line_sample();
    c.bench_function("token_line_decode_whole", |b| {
        b.iter(|| {
            let mut decoder = TokenLineDecoder::new();
            let mut out: Vec<UpstreamEvent> = Vec::with_capacity(300);
            decoder.feed(black_box(&input), &mut out);
            black_box(out.len())
        });
    });

    c.bench_function("token_line_decode_small_chunks", |b| {
        let chunks: Vec<&str> = input
            .as_bytes()
            .chunks(64)
            .map(|chunk| std::str::from_utf8(chunk).expect("ascii sample"))
            .collect();
        b.iter(|| {
            let mut decoder = TokenLineDecoder::new();
            let mut out: Vec<UpstreamEvent> = Vec::with_capacity(300);
            for chunk in &chunks {
                decoder.feed(black_box(chunk), &mut out);
            }
            black_box(out.len())
        });
    });
}

fn bench_json_sse_decode(c: &mut Criterion) {
    let input = json_sse_sample();
    c.bench_function("json_sse_decode_whole", |b| {
        b.iter(|| {
            let mut decoder = JsonSseDecoder::new();
            let mut out: Vec<UpstreamEvent> = Vec::with_capacity(300);
            decoder.feed(black_box(&input), &mut out);
            black_box(out.len())
        });
    });

    c.bench_function("json_sse_decode_small_chunks", |b| {
        let chunks: Vec<&str> = input
            .as_bytes()
            .chunks(64)
            .map(|chunk| std::str::from_utf8(chunk).expect("ascii sample"))
            .collect();
        b.iter(|| {
            let mut decoder = JsonSseDecoder::new();
            let mut out: Vec<UpstreamEvent> = Vec::with_capacity(300);
            for chunk in &chunks {
                decoder.feed(black_box(chunk), &mut out);
            }
            black_box(out.len())
        });
    });
}

criterion_group!(benches, bench_token_line_decode, bench_json_sse_decode);
criterion_main!(benches);

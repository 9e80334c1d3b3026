use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

use callhub::protocol::{IceCandidate, SessionDescription, Signal, SignalKind};
use callhub::signaling::{ClientMessage, ServerMessage};

const OFFER_SDP: &str = "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
a=group:BUNDLE 0 1\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\nc=IN IP4 0.0.0.0\r\n\
a=rtpmap:111 opus/48000/2\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\nc=IN IP4 0.0.0.0\r\n\
a=rtpmap:96 VP8/90000\r\na=setup:actpass\r\n";

fn candidate() -> Signal {
    Signal::Candidate(IceCandidate {
        candidate: "candidate:842163049 1 udp 1677729535 203.0.113.7 46154 typ srflx".to_string(),
        sdp_mid: Some("0".to_string()),
        sdp_m_line_index: Some(0),
        username_fragment: Some("EsAw".to_string()),
    })
}

/// payload decode benchmark
fn bench_decode(c: &mut Criterion) {
    let offer = Signal::Sdp(SessionDescription::offer(OFFER_SDP))
        .encode()
        .unwrap();
    let candidate = candidate().encode().unwrap();

    let mut group = c.benchmark_group("Decode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("offer", |b| {
        b.iter(|| black_box(Signal::decode_as(SignalKind::Sdp, black_box(&offer)).unwrap()))
    });
    group.bench_function("candidate", |b| {
        b.iter(|| {
            black_box(Signal::decode_as(SignalKind::Candidate, black_box(&candidate)).unwrap())
        })
    });

    group.finish();
}

/// payload encode benchmark
fn bench_encode(c: &mut Criterion) {
    let offer = Signal::Sdp(SessionDescription::offer(OFFER_SDP));
    let candidate = candidate();

    let mut group = c.benchmark_group("Encode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("offer", |b| b.iter(|| black_box(offer.encode().unwrap())));
    group.bench_function("candidate", |b| {
        b.iter(|| black_box(candidate.encode().unwrap()))
    });

    group.finish();
}

/// what the relay does per message: parse the envelope, build the event
fn bench_relay_envelope(c: &mut Criterion) {
    let payload = candidate().encode().unwrap();
    let envelope =
        serde_json::to_string(&ClientMessage::new(SignalKind::Candidate, payload)).unwrap();

    let mut group = c.benchmark_group("Relay");
    group.throughput(Throughput::Elements(1));

    group.bench_function("envelope_to_event", |b| {
        b.iter(|| {
            let msg: ClientMessage = serde_json::from_str(black_box(&envelope)).unwrap();
            let (kind, payload) = msg.into_parts();
            let event = serde_json::to_string(&ServerMessage::relayed(kind, payload)).unwrap();
            black_box(event)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_encode, bench_relay_envelope);
criterion_main!(benches);

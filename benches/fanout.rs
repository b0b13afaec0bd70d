use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use fblite::realtime::{ClientEvent, RoomRegistry};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

// Broadcast cost as room size grows. Receivers are drained after each
// iteration so queues never fill and every frame is delivered.

fn room_with_members(members: usize) -> (RoomRegistry, Vec<mpsc::Receiver<Arc<fblite::realtime::OutboundFrame>>>) {
    let registry = RoomRegistry::new();
    let mut receivers = Vec::with_capacity(members);
    for i in 0..members {
        let (tx, rx) = mpsc::channel(1024);
        let conn = format!("conn-{i}");
        registry.register(&conn, tx);
        registry.join(&conn, "room-bench");
        receivers.push(rx);
    }
    (registry, receivers)
}

fn broadcast_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast");

    for members in [2usize, 16, 128, 1024] {
        group.throughput(Throughput::Elements(members as u64));
        group.bench_with_input(BenchmarkId::from_parameter(members), &members, |b, &members| {
            let (registry, mut receivers) = room_with_members(members);
            b.iter(|| {
                let delivered = registry.broadcast_to_room(
                    "room-bench",
                    "user_typing",
                    json!({"chatId": "room-bench", "userId": "u1", "userName": "Ana"}),
                    Some("conn-0"),
                );
                for rx in receivers.iter_mut() {
                    while rx.try_recv().is_ok() {}
                }
                delivered
            })
        });
    }

    group.finish();
}

fn parse_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");
    let raw = r#"{"event":"typing","data":{"chatId":"chat-1","userId":"u1","userName":"Ana"}}"#;
    group.throughput(Throughput::Bytes(raw.len() as u64));

    group.bench_function("parse_typing", |b| b.iter(|| ClientEvent::parse(raw).unwrap()));

    group.finish();
}

criterion_group!(benches, broadcast_benchmark, parse_benchmark);
criterion_main!(benches);

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use score_engine::sequencer::note_store::{NoteCounter, NoteStore, PickMode, RangeMode};
use score_engine::sequencer::{Note, Scheduler, TICKS_PER_QUARTER};
use score_engine::{ManualClock, Song, Tempo, TransportClock};

/// Sixteen bars of random notes
fn random_store(count: usize, seed: u64) -> NoteStore {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut store = NoteStore::new(count, NoteCounter::new());
    let span = TICKS_PER_QUARTER * 4 * 16;
    for id in 1..=count as u64 {
        let note = Note::new(
            id,
            rng.gen_range(24..=96),
            rng.gen_range(0..span),
            rng.gen_range(30..=960),
            rng.gen_range(0.1..=1.0),
        )
        .unwrap();
        store.insert(note).unwrap();
    }
    store
}

/// Benchmark window queries (one per heartbeat on the playback path)
fn bench_range_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("note_store_range");
    for count in [100usize, 1_000, 10_000] {
        let store = random_store(count, 7);
        group.bench_with_input(BenchmarkId::new("start_only", count), &store, |b, store| {
            let mut start = 0;
            b.iter(|| {
                start = (start + 48) % 30_720;
                black_box(store.range_query(start, start + 48, RangeMode::StartOnly));
            });
        });
        group.bench_with_input(BenchmarkId::new("full_overlap", count), &store, |b, store| {
            b.iter(|| black_box(store.range_query(7_680, 9_600, RangeMode::FullOverlap)));
        });
    }
    group.finish();
}

/// Benchmark hit-testing under the cursor
fn bench_point_query(c: &mut Criterion) {
    let store = random_store(10_000, 11);
    c.bench_function("note_store_point_single", |b| {
        let mut tick = 0;
        b.iter(|| {
            tick = (tick + 97) % 30_720;
            black_box(store.point_query(tick, 48, 72, PickMode::Single));
        });
    });
}

/// Benchmark insert + remove churn on a populated store
fn bench_edit_churn(c: &mut Criterion) {
    c.bench_function("note_store_insert_remove", |b| {
        let mut store = NoteStore::new(5_001, NoteCounter::new());
        for note in random_store(5_000, 3).to_ordered_snapshot() {
            store.insert(note).unwrap();
        }
        let mut rng = StdRng::seed_from_u64(5);
        let mut id = 1_000_000;
        b.iter(|| {
            id += 1;
            let note = Note::new(id, 60, rng.gen_range(0..30_720), 120, 0.8).unwrap();
            store.insert(note).unwrap();
            black_box(store.remove(id));
        });
    });
}

/// Benchmark a full scheduler pass over a dense song
fn bench_scheduler_pass(c: &mut Criterion) {
    let mut song = Song::new("Bench");
    let pattern = song.add_pattern("Dense", TICKS_PER_QUARTER * 4 * 16).unwrap();
    let mut rng = StdRng::seed_from_u64(13);
    for _ in 0..5_000 {
        let start = rng.gen_range(0..TICKS_PER_QUARTER * 4 * 16);
        song.add_note(pattern, rng.gen_range(36..=84), start, 120, 0.8).unwrap();
    }
    for t in 0..4 {
        let track = song.add_track(format!("Track {}", t)).unwrap();
        let synth = song.add_instrument(format!("Synth {}", t), "synth").unwrap();
        song.add_track_target(track, synth).unwrap();
        song.add_playlist_item(track, pattern, 0, None).unwrap();
    }

    let clock = ManualClock::new();
    let mut transport = TransportClock::new(Box::new(clock.clone()), Tempo::new(120.0), 0.0);
    transport.start();
    let mut scheduler = Scheduler::new(0.05);

    c.bench_function("scheduler_pass", |b| {
        b.iter(|| {
            clock.advance(0.01);
            if transport.position() > 30.0 {
                transport.seek(score_engine::SeekTarget::Seconds(0.0));
                scheduler.reset(0);
            }
            black_box(scheduler.tick(&mut song, &mut transport));
        });
    });
}

criterion_group!(
    benches,
    bench_range_query,
    bench_point_query,
    bench_edit_churn,
    bench_scheduler_pass
);
criterion_main!(benches);

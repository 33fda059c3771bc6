use criterion::{black_box, criterion_group, criterion_main, Criterion};
use memfx::{Effect, PatchEffect, ProcessHandle, ReapplyPolicy, SimulatedProcess};

fn setup() -> (SimulatedProcess, ProcessHandle) {
    let sim = SimulatedProcess::new(1, "bench.exe");
    sim.map_module("bench.exe", 0x40_0000, 0x1_0000);
    sim.map_region(0x9000_0000, 0x1000, true);
    sim.poke(0x40_0100, &0x9000_0000u64.to_le_bytes()).unwrap();
    sim.poke(0x9000_0010, &0x9000_0800u64.to_le_bytes()).unwrap();
    let handle = ProcessHandle::from_backend(sim.backend()).unwrap();
    (sim, handle)
}

fn benchmark_pointer_ops(c: &mut Criterion) {
    let (_sim, handle) = setup();

    let flat = handle.pointer("bench.exe", 0x200);
    c.bench_function("module_pointer_read_int", |b| {
        b.iter(|| black_box(flat.read_int().unwrap()));
    });

    let deep = handle.pointer("bench.exe", 0x100).deep([0x10, 0x20]);
    c.bench_function("deep_pointer_read_int", |b| {
        b.iter(|| black_box(deep.read_int().unwrap()));
    });

    c.bench_function("deep_pointer_write_int", |b| {
        b.iter(|| deep.write_int(black_box(42)).unwrap());
    });
}

fn benchmark_effects(c: &mut Criterion) {
    let (_sim, handle) = setup();
    let mut effect = PatchEffect::set(
        0,
        ReapplyPolicy::Refresh,
        handle.pointer("bench.exe", 0x300),
        127u8,
    );

    c.bench_function("patch_apply_revert", |b| {
        b.iter(|| {
            effect.apply().unwrap();
            effect.revert().unwrap();
        });
    });

    effect.apply().unwrap();
    c.bench_function("patch_refresh_unchanged", |b| {
        b.iter(|| effect.apply().unwrap());
    });
}

criterion_group!(benches, benchmark_pointer_ops, benchmark_effects);
criterion_main!(benches);

use criterion::{Criterion, criterion_group, criterion_main};
use hma_service::{AppConfig, HideConfig, SystemApps, Template, decide};
use std::hint::black_box;

fn fixture() -> (HideConfig, SystemApps) {
    let mut config = HideConfig::default();
    for t in 0..8 {
        config.templates.insert(
            format!("template{}", t),
            Template {
                is_whitelist: t % 2 == 0,
                app_list: (0..200).map(|i| format!("com.listed{}.app{}", t, i)).collect(),
            },
        );
    }
    for c in 0..100 {
        config.scope.insert(
            format!("com.caller.app{}", c),
            AppConfig {
                use_whitelist: c % 2 == 0,
                apply_templates: (0..8).map(|t| format!("template{}", t)).collect(),
                extra_app_list: (0..20).map(|i| format!("com.extra.app{}", i)).collect(),
                ..AppConfig::default()
            },
        );
    }
    let system: SystemApps = (0..300).map(|i| format!("com.android.sys{}", i)).collect();
    (config, system)
}

fn bench_decide(c: &mut Criterion) {
    let (config, system) = fixture();

    c.bench_function("decide_out_of_scope", |b| {
        b.iter(|| {
            decide(
                black_box(Some("com.unrelated.app")),
                black_box(Some("com.listed7.app199")),
                &config,
                &system,
            )
        })
    });

    c.bench_function("decide_last_template", |b| {
        b.iter(|| {
            decide(
                black_box(Some("com.caller.app51")),
                black_box(Some("com.listed7.app199")),
                &config,
                &system,
            )
        })
    });

    c.bench_function("decide_default", |b| {
        b.iter(|| {
            decide(
                black_box(Some("com.caller.app50")),
                black_box(Some("com.nowhere.app")),
                &config,
                &system,
            )
        })
    });
}

criterion_group!(benches, bench_decide);
criterion_main!(benches);

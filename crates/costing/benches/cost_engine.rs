use criterion::{Criterion, black_box, criterion_group, criterion_main};
use quoteforge_core::{Decimal, EquipmentId, ProcessStepId};
use quoteforge_costing::{CostEngine, CostParameters, Equipment, ProcessRouteDetail, ProcessStep, ResolvedStep};

fn route(steps: u32) -> Vec<ResolvedStep> {
    (1..=steps)
        .map(|sequence| {
            let step = ProcessStep {
                id: ProcessStepId::new(),
                code: format!("OP{sequence}"),
                name: format!("Operation {sequence}"),
                setup_time_minutes: Decimal::from(30),
                cycle_time_seconds: Decimal::from(5),
                labor_headcount: Decimal::ONE,
                requires_equipment: true,
                default_equipment_id: None,
            };
            let mut detail = ProcessRouteDetail::new(sequence, step.id);
            detail.yield_rate = Decimal::from(98);
            ResolvedStep {
                detail,
                step,
                equipment: Some(Equipment {
                    id: EquipmentId::new(),
                    code: "PRESS".to_string(),
                    name: "Press".to_string(),
                    purchase_cost: Decimal::from(120_000),
                    depreciation_years: 8,
                    annual_maintenance_cost: Decimal::from(3_500),
                    power_consumption: Decimal::from(22),
                }),
            }
        })
        .collect()
}

fn bench_calculate(c: &mut Criterion) {
    let engine = CostEngine::default();
    let params = CostParameters::default();

    for steps in [1u32, 8, 32] {
        let resolved = route(steps);
        c.bench_function(&format!("calculate_{steps}_steps"), |b| {
            b.iter(|| {
                engine
                    .calculate(
                        black_box(&resolved),
                        black_box(10_000),
                        Decimal::from(2_500),
                        None,
                        &params,
                    )
                    .unwrap()
            })
        });
    }
}

criterion_group!(benches, bench_calculate);
criterion_main!(benches);

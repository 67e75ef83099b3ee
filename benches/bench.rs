// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use criterion::*;

use hyperical::{
    c64,
    calibration::{
        create_gaintable_from_blockvisibility, solve_gaintable, JonesShape, SolverSettings,
        Timeslice,
    },
    simulate::{antenna_gains, corrupt_visibility, simulate_visibility, ObservationLayout},
    skymodel::{predict_skycomponent_visibility, SkyComponent},
    Jones,
};

fn jones_operations(c: &mut Criterion) {
    let j = Jones::from([
        c64::new(1.0, -2.0),
        c64::new(5.0, -6.0),
        c64::new(3.0, -4.0),
        c64::new(7.0, -8.0),
    ]);
    let j2 = j * 2.0;

    c.bench_function("hermitian multiply", |b| {
        b.iter(|| black_box(j).mul_hermitian(&j2))
    });
    c.bench_function("inverse", |b| b.iter(|| black_box(j).inv()));
}

fn calibration(c: &mut Criterion) {
    let freqs = vec![150e6, 160e6];
    let layout = ObservationLayout::new(32, 4, 60.0, freqs.clone());
    let components = [
        SkyComponent::unpolarised(0.01, -0.02, 2.0, freqs.clone()),
        SkyComponent::unpolarised(-0.03, 0.01, 1.0, freqs),
    ];
    let mut model = simulate_visibility(&layout);
    predict_skycomponent_visibility(&mut model, &components);
    let mut observed = model.clone();
    corrupt_visibility(&mut observed, &antenna_gains(32, 0.1, 0.5));

    let (Ok(model), Ok(observed)) = (model.to_block(), observed.to_block()) else {
        panic!("simulated visibilities should be regular");
    };
    let settings = SolverSettings::default();

    for shape in [JonesShape::Vector, JonesShape::Matrix] {
        c.bench_function(&format!("solve {shape:?} gains, 32 antennas"), |b| {
            b.iter(|| {
                let gt = create_gaintable_from_blockvisibility(&observed, Timeslice::Auto, shape)
                    .unwrap();
                solve_gaintable(&observed, &model, gt, false, &settings).unwrap()
            })
        });
    }
}

criterion_group!(benches, jones_operations, calibration);
criterion_main!(benches);

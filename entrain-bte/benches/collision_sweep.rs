use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use entrain_bte::collision::CollisionKernelBuilder;
use entrain_bte::comms::SerialCommunicator;
use entrain_bte::response::{Conditions, FieldKind, FieldTermBuilder};
use entrain_bte::scattering::{
    PhononMediatedProcess, PhononPartner, ThreePhononClass, ThreePhononProcess,
};
use utilities::stores::{InMemoryElectronStore, InMemoryPhononStore};
use utilities::{toy_electron_fixture, toy_phonon_fixture, uniform_rate_table};

pub fn bench_phonon_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("phonon_sweep");
    let communicator = SerialCommunicator;

    for divisions in [5_usize, 9, 13].into_iter() {
        let (mesh, system) = toy_phonon_fixture([divisions; 3], 1);
        let rates = uniform_rate_table(&mesh, 1, 1e11);

        // A pair of combination records per source state so the sweep pays
        // for in-scattering lookups as well as the relaxation term
        let mut store = InMemoryPhononStore::new(mesh.num_irreducible_points());
        for source in 0..mesh.num_irreducible_points() {
            let representative = mesh.representative(source);
            store.insert_three_phonon(
                source,
                vec![
                    ThreePhononProcess {
                        class: ThreePhononClass::Plus,
                        q2: mesh.neighbour(representative, 0, true),
                        q3: mesh.neighbour(representative, 1, true),
                        weight: 1e9,
                    },
                    ThreePhononProcess {
                        class: ThreePhononClass::Minus,
                        q2: mesh.neighbour(representative, 1, false),
                        q3: mesh.neighbour(representative, 2, false),
                        weight: 1e9,
                    },
                ],
            );
        }

        let field_term = FieldTermBuilder::new()
            .with_mesh(&mesh)
            .with_system(&system)
            .with_rates(&rates)
            .with_communicator(&communicator)
            .with_conditions(Conditions {
                temperature: 300.0,
                chemical_potential: 0.0,
            })
            .build(FieldKind::Temperature)
            .unwrap();
        let kernel = CollisionKernelBuilder::new()
            .with_mesh(&mesh)
            .with_system(&system)
            .with_rates(&rates)
            .with_phonon_store(&store)
            .with_communicator(&communicator)
            .build();
        let response = utilities::random_response(&system);

        group.bench_with_input(
            BenchmarkId::from_parameter(divisions),
            &divisions,
            |b, _| {
                b.iter(|| {
                    kernel
                        .advance_dragless(black_box(&response), black_box(&field_term))
                        .unwrap()
                })
            },
        );
    }
    group.finish();
}

pub fn bench_electron_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("electron_sweep");
    let communicator = SerialCommunicator;

    for divisions in [5_usize, 9, 13].into_iter() {
        let (mesh, system) = toy_electron_fixture([divisions; 3], 1);
        let rates = uniform_rate_table(&mesh, 1, 1e12);

        let mut store = InMemoryElectronStore::new(mesh.num_irreducible_points());
        for source in 0..mesh.num_irreducible_points() {
            let representative = mesh.representative(source);
            store.insert_phonon_mediated(
                source,
                vec![PhononMediatedProcess {
                    final_state: mesh.neighbour(representative, 0, true),
                    phonon: PhononPartner {
                        state: 0,
                        reversed: false,
                    },
                    weight: 1e10,
                }],
            );
        }

        let field_term = FieldTermBuilder::new()
            .with_mesh(&mesh)
            .with_system(&system)
            .with_rates(&rates)
            .with_communicator(&communicator)
            .with_conditions(Conditions {
                temperature: 300.0,
                chemical_potential: 5e-20,
            })
            .build(FieldKind::Electric)
            .unwrap();
        let kernel = CollisionKernelBuilder::new()
            .with_mesh(&mesh)
            .with_system(&system)
            .with_rates(&rates)
            .with_electron_store(&store)
            .with_communicator(&communicator)
            .build();
        let response = utilities::random_response(&system);

        group.bench_with_input(
            BenchmarkId::from_parameter(divisions),
            &divisions,
            |b, _| {
                b.iter(|| {
                    kernel
                        .advance_dragless(black_box(&response), black_box(&field_term))
                        .unwrap()
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_phonon_sweep, bench_electron_sweep);
criterion_main!(benches);

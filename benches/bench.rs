use divan::{black_box, Bencher};
use qshade::{
    compute_amplitude_display, initialize_global, read_qubit_densities, simulate_circuit,
    AmplitudeState, Circuit, Controls, Engine,
};

fn main() {
    initialize_global().unwrap();
    divan::main();
}

fn setup(qubits: u32) -> (Engine, AmplitudeState) {
    let engine = Engine::global().unwrap();
    let state = AmplitudeState::random(&engine, qubits, 123).unwrap();
    (engine, state)
}

mod circuits {
    use super::*;

    #[divan::bench(args = [8, 16])]
    fn random_circuit(bencher: Bencher, qubits: u32) {
        let engine = Engine::global().unwrap();
        let circuit = Circuit::random(qubits, 64, 123).unwrap();
        bencher.bench_local(move || simulate_circuit(black_box(&engine), black_box(&circuit), 0.5));
    }
}

mod displays {
    use super::*;

    #[divan::bench(args = [8, 16])]
    fn amplitude_display(bencher: Bencher, qubits: u32) {
        let (_engine, state) = setup(qubits);
        let controls = Controls::bit(0, true).unwrap();
        bencher.bench_local(move || compute_amplitude_display(black_box(&state), controls, 2, 3));
    }

    #[divan::bench(args = [8, 16])]
    fn qubit_densities(bencher: Bencher, qubits: u32) {
        let (_engine, state) = setup(qubits);
        bencher.bench_local(move || read_qubit_densities(black_box(&state), None));
    }
}

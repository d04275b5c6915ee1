use num_complex::Complex;
use qshade::{
    circuit_shaders, compute_amplitude_display, evaluate_column,
    gate::{self, Gate, GateKernel},
    read_qubit_densities, AmplitudeState, Controls, Engine, EngineConfig, Format, Matrix,
    SimError, SuperpositionReadout,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};

fn engine() -> Engine {
    Engine::new(EngineConfig::default().with_threads(4).with_max_qubits(16)).unwrap()
}

fn c(re: f32, im: f32) -> Complex<f32> {
    Complex::new(re, im)
}

fn assert_almost_eq(result: &[Complex<f32>], expected: &[Complex<f32>], tolerance: f32) {
    assert_eq!(result.len(), expected.len(), "length mismatch");
    for (i, (r, e)) in result.iter().zip(expected).enumerate() {
        assert!(
            (r - e).norm() <= tolerance,
            "k={i:b}\nresult={result:?}\nexpected={expected:?}",
        );
    }
}

fn random_amplitudes(rng: &mut SmallRng, len: usize, scale: f32) -> Vec<Complex<f32>> {
    (0..len)
        .map(|_| c(rng.random_range(-scale..scale), rng.random_range(-scale..scale)))
        .collect()
}

fn normalized(mut amplitudes: Vec<Complex<f32>>) -> Vec<Complex<f32>> {
    let norm = amplitudes.iter().map(|a| a.norm_sqr()).sum::<f32>().sqrt();
    amplitudes.iter_mut().for_each(|a| *a /= norm);
    amplitudes
}

/// The matrix a gate kernel implements on `height` wires, column by column.
fn reconstruct_matrix(engine: &Engine, gate: &dyn GateKernel, height: u32, time: f64) -> Vec<Vec<Complex<f32>>> {
    (0..1 << height)
        .map(|i| {
            let state = AmplitudeState::classical(engine, height, i).unwrap();
            evaluate_column(&state, Controls::NONE, &[(0, gate)], time)
                .unwrap()
                .read_amplitudes()
                .unwrap()
        })
        .collect()
}

mod kernels {
    use super::*;

    #[test]
    fn control_mask_spanning_many_bits() {
        let engine = engine();
        let controls = Controls::new(0b10_0100_0001, 0b10_0000_0001);
        let mask = circuit_shaders::control_mask(&engine, controls, 10).unwrap();
        assert_eq!(mask.format(), Format::Mask);
        assert_eq!((mask.width(), mask.height()), (32, 32));
        let pixels = mask.read_pixels().unwrap();
        for (k, v) in pixels.iter().enumerate() {
            let expected = (k & 0b10_0100_0001) == 0b10_0000_0001;
            assert_eq!(*v, if expected { 1.0 } else { 0.0 }, "k={k:b}");
        }
        assert_eq!(pixels.iter().sum::<f32>(), 128.0);

        let bytes = mask.read_bytes().unwrap();
        assert_eq!(bytes.len(), 1024);
        for (k, b) in bytes.iter().enumerate() {
            let expected = (k & 0b10_0100_0001) == 0b10_0000_0001;
            assert_eq!(*b, if expected { 255 } else { 0 }, "k={k:b}");
        }
    }

    #[test]
    fn control_mask_wide_texture() {
        // 13 qubits lay out as a 128x64 texture.
        let engine = engine();
        let controls = Controls::new(1 << 12 | 1 << 3, 1 << 3);
        let pixels = circuit_shaders::control_mask(&engine, controls, 13)
            .unwrap()
            .read_pixels()
            .unwrap();
        let allowed: Vec<usize> = (0..1 << 13)
            .filter(|k| k & (1 << 12 | 1 << 3) == 1 << 3)
            .collect();
        let actual: Vec<usize> = (0..1 << 13).filter(|&k| pixels[k] == 1.0).collect();
        assert_eq!(actual, allowed);
    }

    #[test]
    fn control_select_compacts() {
        let engine = engine();
        let amplitudes: Vec<Complex<f32>> = (0..8).map(|k| c(k as f32, -(k as f32))).collect();
        let source = engine.upload_complex(&amplitudes).unwrap();

        let picked = |controls: Controls| {
            circuit_shaders::control_select(controls, &source)
                .unwrap()
                .read_complex()
                .unwrap()
                .iter()
                .map(|a| a.re as u32)
                .collect::<Vec<u32>>()
        };
        assert_eq!(picked(Controls::bit(1, true).unwrap()), vec![2, 3, 6, 7]);
        assert_eq!(picked(Controls::bit(0, false).unwrap()), vec![0, 2, 4, 6]);
        assert_eq!(picked(Controls::bit(2, true).unwrap()), vec![4, 5, 6, 7]);
        assert_eq!(picked(Controls::new(0b101, 0b001)), vec![1, 3]);
        assert_eq!(picked(Controls::NONE), (0..8).collect::<Vec<u32>>());
    }

    #[test]
    fn control_select_keeps_layout() {
        let engine = engine();
        let data: Vec<f32> = (0..32).map(|v| v as f32).collect();
        let source = engine.upload(Format::Vec4, &data).unwrap();
        let selected = circuit_shaders::control_select(Controls::bit(2, true).unwrap(), &source).unwrap();
        assert_eq!(selected.format(), Format::Vec4);
        assert_eq!(selected.read_vec4().unwrap()[0], [16.0, 17.0, 18.0, 19.0]);
    }

    #[test]
    fn linear_overlay_offsets() {
        let engine = engine();
        let background: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let foreground: Vec<f32> = (0..4).map(|v| 100.0 + v as f32).collect();
        let back = engine.upload(Format::Mask, &background).unwrap();
        let fore = engine.upload(Format::Mask, &foreground).unwrap();
        for offset in [0u32, 1, 2, 4, 12, 13] {
            let expected: Vec<f32> = (0..16usize)
                .map(|i| match i.checked_sub(offset as usize) {
                    Some(j) if j < 4 => foreground[j],
                    _ => background[i],
                })
                .collect();
            let result = circuit_shaders::linear_overlay(offset, &fore, &back)
                .unwrap()
                .read_pixels()
                .unwrap();
            assert_eq!(result, expected, "offset={offset}");
        }
    }

    #[test]
    fn classical_states() {
        let engine = engine();
        let state = AmplitudeState::classical(&engine, 3, 5).unwrap();
        let mut expected = vec![c(0.0, 0.0); 8];
        expected[5] = c(1.0, 0.0);
        assert_eq!(state.read_amplitudes().unwrap(), expected);
        assert!(AmplitudeState::classical(&engine, 3, 8).is_err());
    }
}

mod gates {
    use super::*;

    #[test]
    fn swap_adjacent_is_exact_permutation() {
        let engine = engine();
        let swap = Gate::swap(1);
        let columns = reconstruct_matrix(&engine, &swap, 2, 0.0);
        let expected = Matrix::permutation(4, |e| [0, 2, 1, 3][e]);
        for (col, amplitudes) in columns.iter().enumerate() {
            for (row, a) in amplitudes.iter().enumerate() {
                assert_eq!(f64::from(a.re), expected.get(row, col).re);
                assert_eq!(a.im, 0.0);
            }
        }
    }

    #[test]
    fn swap_non_adjacent_is_exact_permutation() {
        let engine = engine();
        let swap = Gate::swap(2);
        let columns = reconstruct_matrix(&engine, &swap, 3, 0.0);
        let expected = Matrix::permutation(8, |e| (e & 0b010) | ((e & 1) << 2) | (e >> 2));
        for (col, amplitudes) in columns.iter().enumerate() {
            for (row, a) in amplitudes.iter().enumerate() {
                assert_eq!(f64::from(a.re), expected.get(row, col).re, "col={col} row={row}");
            }
        }
    }

    #[test]
    fn controlled_swap_leaves_disallowed_states() {
        let engine = engine();
        let swap = Gate::swap(2);
        let amplitudes: Vec<Complex<f32>> = (0..8).map(|k| c(k as f32, 0.0)).collect();
        let state = AmplitudeState::from_amplitudes(&engine, &amplitudes).unwrap();
        let out = evaluate_column(&state, Controls::bit(1, true).unwrap(), &[(0, &swap)], 0.0)
            .unwrap()
            .read_amplitudes()
            .unwrap();
        let order: Vec<u32> = out.iter().map(|a| a.re as u32).collect();
        assert_eq!(order, vec![0, 1, 2, 6, 4, 5, 3, 7]);
    }

    #[test]
    fn random_matrix_operations() {
        let engine = engine();
        let mut rng = SmallRng::seed_from_u64(1);
        for span in 1..=4u32 {
            for _ in 0..5 {
                let extra_wires = rng.random_range(0..5u32);
                let anchor = if extra_wires == 0 {
                    0
                } else {
                    rng.random_range(0..extra_wires)
                };
                let mut controls = Controls::NONE;
                for i in 0..extra_wires {
                    if rng.random_bool(0.5) {
                        let wire = if i < anchor { i } else { i + span };
                        controls = controls.and(Controls::bit(wire, rng.random_bool(0.5)).unwrap()).unwrap();
                    }
                }

                let size = 1usize << span;
                let entries: Vec<Complex<f64>> = random_amplitudes(&mut rng, size * size, 1.0)
                    .into_iter()
                    .map(|a| Complex::new(f64::from(a.re), f64::from(a.im)))
                    .collect();
                let matrix = Matrix::new(size, entries).unwrap();
                let gate = Gate::from_matrix("M", "Random Matrix", matrix.clone()).unwrap();

                let qubits = span + extra_wires;
                let input = random_amplitudes(&mut rng, 1 << qubits, 5.0);
                let state = AmplitudeState::from_amplitudes(&engine, &input).unwrap();
                let result = evaluate_column(&state, controls, &[(anchor, &gate)], 0.0)
                    .unwrap()
                    .read_amplitudes()
                    .unwrap();

                let input64: Vec<Complex<f64>> = input
                    .iter()
                    .map(|a| Complex::new(f64::from(a.re), f64::from(a.im)))
                    .collect();
                let expected: Vec<Complex<f32>> = matrix
                    .apply_to_state_vector_at_qubit_with_controls(&input64, anchor, controls)
                    .iter()
                    .map(|a| c(a.re as f32, a.im as f32))
                    .collect();
                assert_almost_eq(&result, &expected, 0.005);
            }
        }
    }

    #[test]
    fn universal_not() {
        let engine = engine();
        let state =
            AmplitudeState::from_amplitudes(&engine, &[c(1.0, 2.0), c(3.0, -4.0)]).unwrap();
        let out = evaluate_column(&state, Controls::NONE, &[(0, &Gate::universal_not())], 0.0)
            .unwrap()
            .read_amplitudes()
            .unwrap();
        assert_eq!(out, vec![c(3.0, 4.0), c(-1.0, 2.0)]);
    }

    #[test]
    fn counting_gates_match_their_matrices() {
        let engine = engine();
        let time = 6.0 / 7.0;
        for gate in gate::all_counting_gates() {
            let Some(matrix) = gate.matrix_at(time) else {
                continue;
            };
            let columns = reconstruct_matrix(&engine, &gate, gate.height, time);
            for (col, amplitudes) in columns.iter().enumerate() {
                for (row, a) in amplitudes.iter().enumerate() {
                    let e = matrix.get(row, col);
                    assert!(
                        (f64::from(a.re) - e.re).abs() < 1e-4 && (f64::from(a.im) - e.im).abs() < 1e-4,
                        "{}: row={row} col={col} kernel={a} matrix={e}",
                        gate.serialized_id
                    );
                }
            }
        }
    }

    #[test]
    fn large_counting_gate_adds_its_count() {
        let engine = engine();
        let time = 6.0 / 7.0;
        let gate = gate::counting_gate(5).unwrap();
        assert!(gate.matrix_at(time).is_none());
        let count = (time * 32.0).floor() as usize;
        for i in [0usize, 3, 17, 31] {
            let state = AmplitudeState::classical(&engine, 6, i as u32 | 1 << 5).unwrap();
            let out = evaluate_column(&state, Controls::NONE, &[(0, &gate)], time)
                .unwrap()
                .read_amplitudes()
                .unwrap();
            let hot: Vec<usize> = (0..64).filter(|&k| out[k].re == 1.0).collect();
            assert_eq!(hot, vec![((i + count) % 32) | 1 << 5]);
        }
    }

    #[test]
    fn shift_gates_rotate() {
        let engine = engine();
        // 4 wires, t = 0.25 rotates by one.
        let left = gate::left_shift_cycling_gate(4).unwrap();
        let right = gate::right_shift_cycling_gate(4).unwrap();
        let state = AmplitudeState::classical(&engine, 4, 0b0011).unwrap();
        let hot = |gate: &Gate| {
            let out = evaluate_column(&state, Controls::NONE, &[(0, gate)], 0.25)
                .unwrap()
                .read_amplitudes()
                .unwrap();
            (0..16).find(|&k| out[k].re == 1.0)
        };
        assert_eq!(hot(&left), Some(0b0110));
        assert_eq!(hot(&right), Some(0b1001));
    }

    #[test]
    fn gate_without_matrix_or_kernel() {
        let engine = engine();
        let state = AmplitudeState::classical(&engine, 1, 0).unwrap();
        let gate = Gate::from_varying_matrix("?", "Mystery", 1, |_| Matrix::identity(2))
            .with_known_matrix(gate::MatrixSource::None);
        assert_eq!(
            evaluate_column(&state, Controls::NONE, &[(0, &gate)], 0.0).unwrap_err(),
            SimError::GateWithoutKernel {
                name: "Mystery".to_string()
            }
        );
    }
}

mod densities {
    use super::*;

    fn density_of(engine: &Engine, amplitudes: &[Complex<f32>]) -> [f32; 4] {
        let state = AmplitudeState::from_amplitudes(engine, amplitudes).unwrap();
        let d = read_qubit_densities(&state, None).unwrap()[0];
        [d.p00, d.p01.re, d.p01.im, d.p11]
    }

    fn assert_close(result: [f32; 4], expected: [f32; 4]) {
        for (r, e) in result.iter().zip(expected) {
            assert!((r - e).abs() < 1e-5, "result={result:?} expected={expected:?}");
        }
    }

    #[test]
    fn single_qubit_references() {
        let engine = engine();
        let s = std::f32::consts::FRAC_1_SQRT_2;
        assert_close(density_of(&engine, &[c(1.0, 0.0), c(0.0, 0.0)]), [1.0, 0.0, 0.0, 0.0]);
        assert_close(density_of(&engine, &[c(0.0, 0.0), c(1.0, 0.0)]), [0.0, 0.0, 0.0, 1.0]);
        assert_close(density_of(&engine, &[c(s, 0.0), c(s, 0.0)]), [0.5, 0.5, 0.0, 0.5]);
        assert_close(density_of(&engine, &[c(s, 0.0), c(0.0, s)]), [0.5, 0.0, -0.5, 0.5]);
    }

    #[test]
    fn entangled_pair_has_no_coherence() {
        let engine = engine();
        let s = std::f32::consts::FRAC_1_SQRT_2;
        let bell = [c(s, 0.0), c(0.0, 0.0), c(0.0, 0.0), c(s, 0.0)];
        let state = AmplitudeState::from_amplitudes(&engine, &bell).unwrap();
        for d in read_qubit_densities(&state, None).unwrap() {
            assert!((d.p00 - 0.5).abs() < 1e-5);
            assert!(d.p01.norm() < 1e-5);
            assert!((d.p11 - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn product_state_densities() {
        let engine = engine();
        let s = std::f32::consts::FRAC_1_SQRT_2;
        // |1⟩ ⊗ |+⟩ ⊗ |0⟩, qubit 0 lowest.
        let mut amplitudes = vec![c(0.0, 0.0); 8];
        amplitudes[0b010] = c(s, 0.0);
        amplitudes[0b110] = c(s, 0.0);
        let state = AmplitudeState::from_amplitudes(&engine, &amplitudes).unwrap();
        let densities = read_qubit_densities(&state, None).unwrap();
        assert_eq!(densities.len(), 3);
        assert!((densities[0].p11).abs() < 1e-5);
        assert!((densities[1].p11 - 1.0).abs() < 1e-5);
        assert!((densities[2].p01.re - 0.5).abs() < 1e-5);
        assert_eq!(densities[2].bloch_vector().map(|v| v.round()), [1.0, 0.0, 0.0]);
    }
}

mod purity {
    use super::*;

    fn product_state(engine: &Engine, seed: u64) -> (Vec<Complex<f32>>, AmplitudeState) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let inner = normalized(random_amplitudes(&mut rng, 4, 1.0));
        let outer = normalized(random_amplitudes(&mut rng, 2, 1.0));
        let amplitudes: Vec<Complex<f32>> = (0..8).map(|k| inner[k & 3] * outer[k >> 2]).collect();
        (inner, AmplitudeState::from_amplitudes(engine, &amplitudes).unwrap())
    }

    #[test]
    fn separable_range_reports_amplitudes() {
        let engine = engine();
        let (inner, state) = product_state(&engine, 5);
        let readout = compute_amplitude_display(&state, Controls::NONE, 0, 2).unwrap();
        let index = readout.phase_lock_index().unwrap();
        let amplitudes = readout.amplitudes().unwrap();

        let lock = inner[index].conj() / inner[index].norm();
        let expected: Vec<Complex<f32>> = inner.iter().map(|a| a * lock).collect();
        assert_almost_eq(amplitudes, &expected, 1e-3);
        assert!(amplitudes[index].im.abs() < 1e-4 && amplitudes[index].re > 0.0);

        let again = compute_amplitude_display(&state, Controls::NONE, 0, 2).unwrap();
        assert_eq!(again, readout);
    }

    #[test]
    fn separable_range_in_the_middle() {
        let engine = engine();
        let s = std::f32::consts::FRAC_1_SQRT_2;
        // Qubit 1 is |-⟩, qubits 0 and 2 are entangled with each other.
        let mut amplitudes = vec![c(0.0, 0.0); 8];
        for (k, v) in [(0b000, 0.5), (0b010, -0.5), (0b101, 0.5), (0b111, -0.5)] {
            amplitudes[k] = c(v, 0.0);
        }
        let state = AmplitudeState::from_amplitudes(&engine, &amplitudes).unwrap();
        let readout = compute_amplitude_display(&state, Controls::NONE, 1, 1).unwrap();
        assert_eq!(readout.phase_lock_index(), Some(0));
        assert_almost_eq(readout.amplitudes().unwrap(), &[c(s, 0.0), c(-s, 0.0)], 1e-4);
    }

    #[test]
    fn separable_range_with_controls_around_it() {
        let engine = engine();
        let mut rng = SmallRng::seed_from_u64(17);
        for _ in 0..5 {
            // Three independent 2-qubit blocks on wires 0-1, 2-3 and 4-5.
            let low = normalized(random_amplitudes(&mut rng, 4, 1.0));
            let middle = normalized(random_amplitudes(&mut rng, 4, 1.0));
            let high = normalized(random_amplitudes(&mut rng, 4, 1.0));
            let amplitudes: Vec<Complex<f32>> = (0..64)
                .map(|k| low[k & 3] * middle[(k >> 2) & 3] * high[k >> 4])
                .collect();
            let state = AmplitudeState::from_amplitudes(&engine, &amplitudes).unwrap();

            for controls in [
                Controls::bit(0, true).unwrap(),
                Controls::new(0b11_0001, 0b10_0000),
                Controls::new(0b10_0011, 0b00_0010),
            ] {
                let readout = compute_amplitude_display(&state, controls, 2, 2).unwrap();
                let index = readout.phase_lock_index().unwrap();
                let lock = middle[index].conj() / middle[index].norm();
                let expected: Vec<Complex<f32>> = middle.iter().map(|a| a * lock).collect();
                assert_almost_eq(readout.amplitudes().unwrap(), &expected, 2e-3);
            }
        }
    }

    #[test]
    fn entangled_range_matches_marginals() {
        let engine = engine();
        let mut rng = SmallRng::seed_from_u64(23);
        for _ in 0..5 {
            let amplitudes = normalized(random_amplitudes(&mut rng, 32, 1.0));
            let state = AmplitudeState::from_amplitudes(&engine, &amplitudes).unwrap();
            for controls in [Controls::NONE, Controls::bit(0, true).unwrap()] {
                let allowed = |k: &usize| controls.allows_state(*k as u32);
                let mass: f32 = (0..32).filter(allowed).map(|k| amplitudes[k].norm_sqr()).sum();
                let expected: Vec<f32> = (0..4)
                    .map(|j| {
                        (0..32)
                            .filter(allowed)
                            .filter(|k| (k >> 1) & 3 == j)
                            .map(|k| amplitudes[k].norm_sqr())
                            .sum::<f32>()
                            / mass
                    })
                    .collect();

                let readout = compute_amplitude_display(&state, controls, 1, 2).unwrap();
                assert!(!readout.is_pure());
                let p = readout.probabilities().unwrap();
                assert_eq!(p.len(), 4);
                for (p, e) in p.iter().zip(&expected) {
                    assert!((p - e).abs() < 1e-4, "p={p} expected={e}");
                }
            }
        }
    }

    #[test]
    fn entangled_range_reports_probabilities() {
        let engine = engine();
        let s = std::f32::consts::FRAC_1_SQRT_2;
        let bell = [c(s, 0.0), c(0.0, 0.0), c(0.0, 0.0), c(s, 0.0)];
        let state = AmplitudeState::from_amplitudes(&engine, &bell).unwrap();
        for offset in 0..2 {
            let readout = compute_amplitude_display(&state, Controls::NONE, offset, 1).unwrap();
            assert!(readout.amplitudes().is_none());
            let p = readout.probabilities().unwrap();
            assert!((p[0] - 0.5).abs() < 1e-5 && (p[1] - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn controls_disentangle() {
        let engine = engine();
        let s = std::f32::consts::FRAC_1_SQRT_2;
        let bell = [c(s, 0.0), c(0.0, 0.0), c(0.0, 0.0), c(s, 0.0)];
        let state = AmplitudeState::from_amplitudes(&engine, &bell).unwrap();
        let readout = compute_amplitude_display(&state, Controls::bit(1, true).unwrap(), 0, 1).unwrap();
        assert_almost_eq(readout.amplitudes().unwrap(), &[c(0.0, 0.0), c(1.0, 0.0)], 1e-5);
        assert_eq!(readout.phase_lock_index(), Some(1));
    }

    #[test]
    fn whole_register_has_no_phase_lock() {
        let engine = engine();
        let amplitudes = [c(0.0, 0.6), c(0.8, 0.0)];
        let state = AmplitudeState::from_amplitudes(&engine, &amplitudes).unwrap();
        let readout = compute_amplitude_display(&state, Controls::NONE, 0, 1).unwrap();
        assert_eq!(readout.phase_lock_index(), None);
        assert_almost_eq(readout.amplitudes().unwrap(), &amplitudes, 1e-5);
    }

    #[test]
    fn no_mass_is_ambiguous() {
        let engine = engine();
        let state = AmplitudeState::from_amplitudes(&engine, &[c(0.0, 0.0); 4]).unwrap();
        assert_eq!(
            compute_amplitude_display(&state, Controls::NONE, 0, 1).unwrap(),
            SuperpositionReadout::Ambiguous
        );
    }

    #[test]
    fn overlapping_controls_are_rejected() {
        let engine = engine();
        let state = AmplitudeState::classical(&engine, 3, 0).unwrap();
        assert_eq!(
            compute_amplitude_display(&state, Controls::bit(1, true).unwrap(), 0, 2).unwrap_err(),
            SimError::ControlsOverlapTargets { overlap: 0b10 }
        );
    }
}

mod resources {
    use super::*;

    #[test]
    fn textures_return_to_the_pool() {
        let engine = engine();
        {
            let state = AmplitudeState::random(&engine, 4, 9).unwrap();
            let _readout = compute_amplitude_display(&state, Controls::NONE, 1, 2).unwrap();
            let _densities = read_qubit_densities(&state, None).unwrap();
        }
        let stats = engine.stats();
        assert_eq!(stats.live, 0);
        assert!(stats.pooled > 0);
        assert_eq!(engine.drain_pool(), stats.pooled);
        assert_eq!(engine.stats().pooled, 0);
    }

    #[test]
    fn oversized_textures_are_refused() {
        let engine = Engine::new(EngineConfig::default().with_threads(1).with_max_qubits(4)).unwrap();
        assert_eq!(
            engine.alloc(5, Format::Vec2).unwrap_err(),
            SimError::ResourceExhausted {
                qubits: 5,
                format: Format::Vec2,
                bytes: 256,
                limit: 128
            }
        );
        assert!(engine.alloc(4, Format::Vec2).is_ok());
    }

    #[test]
    fn address_sized_textures_are_refused() {
        let engine = Engine::new(EngineConfig::default().with_threads(1).with_max_qubits(64)).unwrap();
        match engine.alloc(64, Format::Vec2).unwrap_err() {
            SimError::ResourceExhausted { qubits, bytes, .. } => {
                assert_eq!(qubits, 64);
                assert_eq!(bytes, u64::MAX);
            }
            e => panic!("unexpected error {e}"),
        }
        assert!(matches!(
            engine.alloc(61, Format::Vec4),
            Err(SimError::ResourceExhausted { qubits: 61, .. })
        ));
    }

    #[test]
    fn malformed_uploads() {
        let engine = engine();
        assert_eq!(
            engine.upload(Format::Vec2, &[1.0, 2.0, 3.0]).unwrap_err(),
            SimError::RaggedTextureData {
                len: 3,
                format: Format::Vec2
            }
        );
        assert_eq!(
            engine.upload(Format::Mask, &[1.0, 2.0, 3.0]).unwrap_err(),
            SimError::InvalidTextureLength { len: 3 }
        );
    }

    #[test]
    fn textures_do_not_cross_engines() {
        let a = engine();
        let b = engine();
        let state = AmplitudeState::classical(&a, 2, 0).unwrap();
        let mask = circuit_shaders::control_mask(&b, Controls::NONE, 2).unwrap();
        assert_eq!(
            circuit_shaders::swap(state.texture(), &mask, 0, 1).unwrap_err(),
            SimError::ForeignTexture
        );
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn gpu_backend_needs_feature() {
        let config = EngineConfig::default().with_backend(qshade::BackendKind::Gpu);
        assert_eq!(Engine::new(config).unwrap_err(), SimError::GpuUnavailable);
    }
}

#[cfg(feature = "gpu")]
mod gpu {
    use super::*;
    use qshade::BackendKind;

    /// Runs the same column on both backends.
    #[test]
    fn backends_agree() {
        let Ok(gpu) = Engine::new(EngineConfig::default().with_backend(BackendKind::Gpu)) else {
            return;
        };
        let cpu = engine();
        let mut rng = SmallRng::seed_from_u64(11);
        let input = random_amplitudes(&mut rng, 1 << 6, 1.0);
        let gate = gate::counting_gate(3).unwrap();
        let run = |engine: &Engine| {
            let state = AmplitudeState::from_amplitudes(engine, &input).unwrap();
            evaluate_column(&state, Controls::bit(0, true).unwrap(), &[(2, &gate)], 0.4)
                .unwrap()
                .read_amplitudes()
                .unwrap()
        };
        assert_almost_eq(&run(&gpu), &run(&cpu), 1e-5);
    }
}

#[cfg(feature = "python")]
#[test]
fn python() {
    use pyo3::{ffi::c_str, Python};
    use qshade::python_module;

    pyo3::append_to_inittab!(python_module);
    Python::with_gil(|py| Python::run(py, c_str!(include_str!("test.py")), None, None).unwrap());
}

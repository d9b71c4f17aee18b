// crates/vd_core/tests/end_to_end.rs

//! 端到端同化测试
//! 合成低秩快照 → SVD/解码器降维 → L-BFGS → MAE 评估

use std::sync::Arc;

use nalgebra::DVector;
use vd_config::{
    CompressionMethod, DecoderShape, InitialGuess, ObservationMode, ObservationNoise, VarDaConfig,
};
use vd_core::{
    Activation, Decoder, MlpDecoder, ObservationOperator, PointObservationOperator,
    SnapshotMatrix, SyntheticSnapshots, VarDaPipeline,
};

fn reference_snapshots() -> SnapshotMatrix {
    SyntheticSnapshots {
        n_state: 100,
        n_steps: 50,
        n_modes: 4,
        offset: 1.0,
        noise_std: 0.01,
        seed: 42,
    }
    .generate()
    .unwrap()
}

fn reference_config() -> VarDaConfig {
    VarDaConfig {
        alpha: 1.0,
        obs_variance: 0.01,
        obs_frac: 0.5,
        hist_frac: 0.6,
        tda_idx_from_end: 1,
        compression_method: CompressionMethod::Svd,
        number_modes: 4,
        tolerance: 1e-3,
        ..VarDaConfig::default()
    }
}

/// 参考场景：n=100, M=50 → hist_idx=30, t_DA=49, 50 个观测
#[test]
fn test_reference_scenario_reduces_mae() {
    let x = reference_snapshots();
    let out = VarDaPipeline::new(reference_config())
        .unwrap()
        .run(&x)
        .unwrap();

    assert_eq!(out.split.hist_idx, 30);
    assert_eq!(out.split.t_da, 49);
    assert_eq!(out.observations.count(), 50);
    assert_eq!(out.w0, DVector::zeros(4));
    assert!(out.optimization.status.is_converged(), "{:?}", out.optimization.status);
    assert!(out.report.da_mae() < out.report.ref_mae());
    assert!(out.report.improvement_ratio() < 1.0);

    let basis = out.basis.unwrap();
    assert_eq!(basis.n_modes, 4);
    assert!(basis.captured_variance > 0.9);

    // 背景态为历史均值
    let hist = x.columns(0, 30).unwrap();
    for i in [0, 37, 99] {
        let mean = hist.row(i).sum() / 30.0;
        assert!((out.background[i] - mean).abs() < 1e-12);
    }
}

/// 参考参数原样运行：NUMBER_MODES=5，多个观测种子
#[test]
fn test_reference_scenario_with_five_modes() {
    let x = reference_snapshots();
    for seed in [0, 1, 7, 42, 99] {
        let config = VarDaConfig {
            number_modes: 5,
            seed,
            ..reference_config()
        };
        let out = VarDaPipeline::new(config).unwrap().run(&x).unwrap();

        assert_eq!(out.split.hist_idx, 30);
        assert_eq!(out.split.t_da, 49);
        assert_eq!(out.observations.count(), 50);
        assert_eq!(out.w0, DVector::zeros(5));
        assert_eq!(out.basis.as_ref().unwrap().n_modes, 5);
        assert!(
            out.optimization.status.is_converged(),
            "seed={seed}: {:?}",
            out.optimization.status
        );
        assert!(
            out.report.da_mae() < out.report.ref_mae(),
            "seed={seed}: da={} ref={}",
            out.report.da_mae(),
            out.report.ref_mae()
        );
    }
}

#[test]
fn test_run_is_deterministic() {
    let x = reference_snapshots();
    let pipeline = VarDaPipeline::new(reference_config()).unwrap();
    let a = pipeline.run(&x).unwrap();
    let b = pipeline.run(&x).unwrap();
    assert_eq!(a.observations, b.observations);
    assert_eq!(a.optimization.w_star, b.optimization.w_star);
    assert_eq!(a.report.da_mae(), b.report.da_mae());
}

#[test]
fn test_observation_modes_and_noise() {
    let x = reference_snapshots();
    let modes = [
        ObservationMode::Regular,
        ObservationMode::Fixed {
            indices: (0..100).step_by(4).collect(),
        },
    ];
    for mode in modes {
        let config = VarDaConfig {
            obs_mode: mode,
            obs_noise: ObservationNoise::Gaussian { std_dev: 0.01 },
            ..reference_config()
        };
        let out = VarDaPipeline::new(config).unwrap().run(&x).unwrap();
        assert!(out.report.da_mae() < out.report.ref_mae());
    }
}

#[test]
fn test_full_observation_fraction() {
    let x = reference_snapshots();
    let config = VarDaConfig {
        obs_frac: 1.0,
        ..reference_config()
    };
    let out = VarDaPipeline::new(config).unwrap().run(&x).unwrap();
    assert_eq!(out.observations.count(), 100);
    assert_eq!(out.observations.indices, (0..100).collect::<Vec<_>>());
}

#[test]
fn test_projected_initial_guess() {
    let x = reference_snapshots();
    let config = VarDaConfig {
        initial_guess: InitialGuess::Projected,
        ..reference_config()
    };
    let out = VarDaPipeline::new(config).unwrap().run(&x).unwrap();
    assert!(out.w0.norm() > 0.0);
    assert_eq!(out.optimization.w_star.len(), 4);
    assert!(out.report.da_mae() < out.report.ref_mae());
}

#[test]
fn test_nonlinear_path_with_random_decoder() {
    let x = reference_snapshots();
    let decoder = Arc::new(MlpDecoder::random(2, &[8, 16], 100, Activation::Tanh, 3).unwrap());
    let config = VarDaConfig {
        compression_method: CompressionMethod::Ae,
        decoder: DecoderShape {
            latent_size: 2,
            hidden_layers: vec![16, 8],
        },
        jacobian_batch_size: 1,
        max_iterations: 50,
        ..reference_config()
    };
    let out = VarDaPipeline::new(config)
        .unwrap()
        .with_decoder(decoder.clone())
        .run(&x)
        .unwrap();

    let zero = DVector::zeros(2);
    assert_eq!(out.background, decoder.decode(&zero).unwrap());
    assert!(out.basis.is_none());
    assert_eq!(out.optimization.w_star.len(), 2);
    assert_eq!(out.report.u_da, decoder.decode(&out.optimization.w_star).unwrap());
    assert!(out.report.da_mae().is_finite());
    assert!(out.optimization.cost_evaluations > 0);
}

/// 真值位于解码器流形上：u_c = decode(w_true)，w_true 靠近原点
#[test]
fn test_nonlinear_path_recovers_decoded_truth() {
    let decoder = Arc::new(MlpDecoder::random(2, &[8, 16], 100, Activation::Tanh, 3).unwrap());
    let w_true = DVector::from_vec(vec![0.15, -0.1]);
    let columns: Vec<DVector<f64>> = (0..50)
        .map(|t| {
            let w = if t == 49 {
                w_true.clone()
            } else {
                let phase = t as f64 * 0.3;
                DVector::from_vec(vec![0.1 * phase.sin(), 0.1 * phase.cos()])
            };
            decoder.decode(&w).unwrap()
        })
        .collect();
    let x = SnapshotMatrix::from_columns(&columns).unwrap();

    let config = VarDaConfig {
        compression_method: CompressionMethod::Ae,
        decoder: DecoderShape {
            latent_size: 2,
            hidden_layers: vec![16, 8],
        },
        alpha: 0.1,
        max_iterations: 200,
        ..reference_config()
    };
    let out = VarDaPipeline::new(config)
        .unwrap()
        .with_decoder(decoder.clone())
        .run(&x)
        .unwrap();

    assert_eq!(out.control_state, decoder.decode(&w_true).unwrap());

    // J(0) = ‖d‖²/σ²，d = y − H·decode(0)
    let op = PointObservationOperator::build(
        &out.observations.indices,
        100,
        out.observations.count(),
    )
    .unwrap();
    let d = op
        .residual(&out.background, &out.observations.values)
        .unwrap();
    let cost_at_zero = d.norm_squared() / 0.01;
    assert!(cost_at_zero > 0.0);
    assert!(
        out.optimization.cost <= cost_at_zero,
        "J(w*)={} J(0)={cost_at_zero}",
        out.optimization.cost
    );
    assert!(
        out.report.da_mae() < out.report.ref_mae(),
        "da={} ref={}",
        out.report.da_mae(),
        out.report.ref_mae()
    );
}

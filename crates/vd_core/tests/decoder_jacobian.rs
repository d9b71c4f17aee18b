// crates/vd_core/tests/decoder_jacobian.rs

//! 解码器雅可比一致性测试
//! 前向模式对偶数、显式链式法则、反向传播与中心差分互相校验

use std::time::Duration;

use nalgebra::DVector;
use vd_core::{
    finite_difference_jacobian, Activation, Decoder, JacobianOptions, MlpDecoder,
    NormalizationParams,
};
use vd_foundation::VdError;

fn latent(d: usize, seed: u64) -> DVector<f64> {
    DVector::from_fn(d, |i, _| ((i as u64 + 1) * (seed + 3)) as f64 * 0.173 % 2.0 - 1.0)
}

#[test]
fn test_three_jacobians_agree() {
    for (seed, d, hidden) in [(1, 2, vec![50, 20]), (2, 5, vec![8]), (3, 3, vec![10, 10, 10])] {
        for act in [Activation::Tanh, Activation::Sigmoid] {
            let decoder = MlpDecoder::random(d, &hidden, 40, act, seed).unwrap();
            let w = latent(d, seed);
            let ad = decoder.jacobian(&w, &JacobianOptions::default()).unwrap();
            let explicit = decoder.jacobian_explicit(&w).unwrap();
            let fd = finite_difference_jacobian(&decoder, &w, &JacobianOptions::default()).unwrap();
            assert_eq!(ad.shape(), (40, d));
            assert!((&ad - &explicit).amax() < 1e-12);
            assert!((&ad - &fd).amax() < 1e-7, "seed={seed} act={act:?}");
        }
    }
}

#[test]
fn test_reverse_mode_rows_match() {
    let decoder = MlpDecoder::random(3, &[12, 6], 25, Activation::Tanh, 17)
        .unwrap()
        .with_normalization(NormalizationParams {
            mean: vec![1.0; 25],
            std: (0..25).map(|i| 0.5 + i as f64 * 0.05).collect(),
        })
        .unwrap();
    let w = latent(3, 17);
    let jac = decoder.jacobian(&w, &JacobianOptions::default()).unwrap();
    for i in 0..25 {
        let row = decoder.output_gradient(&w, i).unwrap();
        assert!((row - jac.row(i).transpose()).amax() < 1e-12);
    }
}

#[test]
fn test_batch_size_does_not_change_result() {
    let decoder = MlpDecoder::random(7, &[30], 60, Activation::Tanh, 5).unwrap();
    let w = latent(7, 5);
    let one = decoder
        .jacobian(&w, &JacobianOptions { batch_size: 1, budget: None })
        .unwrap();
    for batch_size in [2, 3, 7, 100] {
        let batched = decoder
            .jacobian(&w, &JacobianOptions { batch_size, budget: None })
            .unwrap();
        assert_eq!(batched, one, "batch_size={batch_size}");
    }
}

#[test]
fn test_budget_exhaustion_is_error() {
    let decoder = MlpDecoder::random(4, &[10], 20, Activation::Tanh, 8).unwrap();
    let options = JacobianOptions {
        batch_size: 1,
        budget: Some(Duration::ZERO),
    };
    let err = decoder.jacobian(&latent(4, 8), &options).unwrap_err();
    assert!(matches!(err, VdError::BudgetExhausted { .. }));

    let generous = JacobianOptions {
        batch_size: 1,
        budget: Some(Duration::from_secs(60)),
    };
    assert!(decoder.jacobian(&latent(4, 8), &generous).is_ok());
}

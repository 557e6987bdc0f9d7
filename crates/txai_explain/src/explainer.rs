//! Explainer selection and a common entry point.

use std::str::FromStr;

use burn::tensor::backend::AutodiffBackend;
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::divergence::Divergence;
use crate::error::{ExplainError, Result};
use crate::gradient::{GradientExplainer, GradientMethod};
use crate::importance::{Aggregation, ImportanceMap, WindowedScores};
use crate::occlusion::{Occlusion, OcclusionKind};
use crate::predictor::Predictor;
use crate::sampler::CounterfactualOrigin;
use crate::winit::{WinIT, WinITConfig};
use txai_core::TSShape;
use txai_models::GeneratorKind;

/// Explainer families that can be requested by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplainerKind {
    /// Windowed importance (one run per window size).
    Winit,
    /// Feature Occlusion.
    Fo,
    /// Augmented Feature Occlusion.
    Afo,
    /// Integrated Gradients.
    Ig,
    /// Input × Gradient.
    Ixg,
}

impl FromStr for ExplainerKind {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "winit" => Ok(ExplainerKind::Winit),
            "fo" => Ok(ExplainerKind::Fo),
            "afo" => Ok(ExplainerKind::Afo),
            "ig" => Ok(ExplainerKind::Ig),
            "ixg" | "inputxgradient" => Ok(ExplainerKind::Ixg),
            name @ ("fit" | "deeplift" | "gradientshap" | "dynamask") => {
                Err(ExplainError::Unsupported(name.to_string()))
            }
            other => Err(ExplainError::UnknownExplainer(other.to_string())),
        }
    }
}

/// Settings shared by every explainer of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainerSettings {
    /// Counterfactual draws per perturbation.
    pub n_samples: usize,
    /// Seed of the sampling RNG.
    pub seed: u64,
    /// Divergences WinIT is run with.
    pub divergences: Vec<Divergence>,
    /// Integrated Gradients steps.
    pub ig_steps: usize,
    /// Joint instead of per-feature generators.
    pub joint: bool,
    /// Condition generators on the history.
    pub conditional: bool,
    /// Sample WinIT counterfactuals from the training data.
    pub use_data_distribution: bool,
}

impl Default for ExplainerSettings {
    fn default() -> Self {
        Self {
            n_samples: 3,
            seed: 2021,
            divergences: vec![Divergence::Pd],
            ig_steps: 50,
            joint: false,
            conditional: true,
            use_data_distribution: false,
        }
    }
}

/// One fully specified explainer run.
#[derive(Debug, Clone, PartialEq)]
pub enum ExplainerSpec {
    /// WinIT with its config.
    WinIT(WinITConfig),
    /// FO or AFO.
    Occlusion {
        /// Variant.
        kind: OcclusionKind,
        /// Draws per observation.
        n_samples: usize,
        /// RNG seed.
        seed: u64,
    },
    /// IG or Input × Gradient.
    Gradient {
        /// Method.
        method: GradientMethod,
        /// Integrated Gradients steps.
        n_steps: usize,
    },
}

impl ExplainerSpec {
    /// Expand requested explainer names into runs.
    ///
    /// `winit` yields one run per (window, divergence) pair; the other
    /// names yield one run each.
    ///
    /// # Errors
    ///
    /// Unknown or unsupported names, or `winit` without windows.
    pub fn resolve(
        names: &[String],
        windows: &[usize],
        settings: &ExplainerSettings,
    ) -> Result<Vec<ExplainerSpec>> {
        let mut specs = Vec::new();
        for name in names {
            match name.parse::<ExplainerKind>()? {
                ExplainerKind::Winit => {
                    if windows.is_empty() || settings.divergences.is_empty() {
                        return Err(ExplainError::InvalidConfig(
                            "winit needs at least one window and one divergence".to_string(),
                        ));
                    }
                    for &window in windows {
                        for &metric in &settings.divergences {
                            specs.push(ExplainerSpec::WinIT(
                                WinITConfig::new(window)
                                    .with_metric(metric)
                                    .with_n_samples(settings.n_samples)
                                    .with_seed(settings.seed)
                                    .with_joint(settings.joint)
                                    .with_conditional(settings.conditional)
                                    .with_data_distribution(settings.use_data_distribution),
                            ));
                        }
                    }
                }
                ExplainerKind::Fo | ExplainerKind::Afo => specs.push(ExplainerSpec::Occlusion {
                    kind: if name.trim().eq_ignore_ascii_case("fo") {
                        OcclusionKind::Fo
                    } else {
                        OcclusionKind::Afo
                    },
                    n_samples: settings.n_samples,
                    seed: settings.seed,
                }),
                kind @ (ExplainerKind::Ig | ExplainerKind::Ixg) => {
                    specs.push(ExplainerSpec::Gradient {
                        method: if kind == ExplainerKind::Ig {
                            GradientMethod::IntegratedGradients
                        } else {
                            GradientMethod::InputXGradient
                        },
                        n_steps: settings.ig_steps,
                    })
                }
            }
        }
        Ok(specs)
    }

    /// Name used for files and result rows.
    pub fn name(&self) -> String {
        match self {
            ExplainerSpec::WinIT(config) => config.name(),
            ExplainerSpec::Occlusion { kind, .. } => kind.as_str().to_string(),
            ExplainerSpec::Gradient { method, .. } => method.as_str().to_string(),
        }
    }

    /// Generator horizon this run needs, if any.
    pub fn generator_horizon(&self) -> Option<usize> {
        match self {
            ExplainerSpec::WinIT(config) if !config.use_data_distribution => Some(config.window),
            _ => None,
        }
    }

    /// Generator kind this run needs.
    pub fn generator_kind(&self) -> GeneratorKind {
        match self {
            ExplainerSpec::WinIT(config) if config.joint => GeneratorKind::Joint,
            _ => GeneratorKind::PerFeature,
        }
    }

    /// Generator checkpoint name shared by runs that can reuse the same model.
    ///
    /// Divergence does not affect the generator, so it is left out.
    pub fn generator_name(&self) -> Option<String> {
        match self {
            ExplainerSpec::WinIT(config) if !config.use_data_distribution => {
                let mut name = String::from("winit");
                if config.joint {
                    name.push_str("_joint");
                }
                if !config.conditional {
                    name.push_str("_uncond");
                }
                Some(name)
            }
            _ => None,
        }
    }
}

/// Result of one explainer run.
#[derive(Debug, Clone)]
pub struct Explanation {
    /// Explainer name.
    pub explainer: String,
    /// `(N, L, V)` scores; for windowed explainers the mean aggregate.
    pub importance: ImportanceMap,
    /// Raw windowed scores, when the explainer produces them.
    pub windowed: Option<WindowedScores>,
    /// Counterfactual source, when the explainer samples.
    pub origin: Option<CounterfactualOrigin>,
}

impl Explanation {
    /// Importance combined with `aggregation`; non-windowed maps are returned as is.
    pub fn importance_for(&self, aggregation: Aggregation) -> ImportanceMap {
        match &self.windowed {
            Some(windowed) => {
                let map = windowed.aggregate(aggregation);
                if self.importance.is_signed() {
                    ImportanceMap::signed(map.into_values())
                } else {
                    map
                }
            }
            None => self.importance.clone(),
        }
    }
}

/// A ready-to-run explainer.
#[derive(Debug)]
pub enum Explainer<B: AutodiffBackend> {
    /// WinIT.
    WinIT(WinIT),
    /// FO / AFO.
    Occlusion(Occlusion),
    /// IG / Input × Gradient.
    Gradient(GradientExplainer<B>),
}

impl<B: AutodiffBackend> Explainer<B> {
    /// Explain `x (N, V, L)`.
    ///
    /// # Errors
    ///
    /// Propagates explainer failures; the result is checked to be `(N, L, V)`.
    pub fn explain<P: Predictor + ?Sized>(
        &self,
        name: &str,
        predictor: &P,
        x: &Array3<f32>,
    ) -> Result<Explanation> {
        let (n, n_vars, seq_len) = x.dim();
        let explanation = match self {
            Explainer::WinIT(winit) => {
                let windowed = winit.attribute(predictor, x)?;
                Explanation {
                    explainer: name.to_string(),
                    importance: windowed.aggregate(Aggregation::Mean),
                    windowed: Some(windowed),
                    origin: Some(winit.origin()),
                }
            }
            Explainer::Occlusion(occlusion) => Explanation {
                explainer: name.to_string(),
                importance: occlusion.attribute(predictor, x)?,
                windowed: None,
                origin: None,
            },
            Explainer::Gradient(gradient) => Explanation {
                explainer: name.to_string(),
                importance: gradient.attribute(x)?,
                windowed: None,
                origin: None,
            },
        };
        explanation.importance.ensure_matches(TSShape::from(x.dim()))?;
        tracing::info!(explainer = name, n, seq_len, n_vars, "explanation computed");
        Ok(explanation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{MarginalMode, MarginalSampler};
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use ndarray::Array2;

    type TestAutodiffBackend = Autodiff<NdArray>;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_expands_winit() {
        let settings = ExplainerSettings {
            divergences: vec![Divergence::Pd, Divergence::Kl],
            ..Default::default()
        };
        let specs =
            ExplainerSpec::resolve(&names(&["winit", "fo", "IG"]), &[5, 10], &settings).unwrap();
        let got: Vec<String> = specs.iter().map(ExplainerSpec::name).collect();
        assert_eq!(
            got,
            vec!["winit_w5_pd", "winit_w5_kl", "winit_w10_pd", "winit_w10_kl", "fo", "ig"]
        );
        assert_eq!(specs[0].generator_horizon(), Some(5));
        assert_eq!(specs[0].generator_name().as_deref(), Some("winit"));
        assert_eq!(specs[4].generator_horizon(), None);
    }

    #[test]
    fn test_unsupported_and_unknown_names() {
        let settings = ExplainerSettings::default();
        assert!(matches!(
            ExplainerSpec::resolve(&names(&["dynamask"]), &[5], &settings),
            Err(ExplainError::Unsupported(_))
        ));
        assert!(matches!(
            ExplainerSpec::resolve(&names(&["lime"]), &[5], &settings),
            Err(ExplainError::UnknownExplainer(_))
        ));
        assert!(ExplainerSpec::resolve(&names(&["winit"]), &[], &settings).is_err());
    }

    #[test]
    fn test_datadist_needs_no_generator() {
        let settings = ExplainerSettings {
            use_data_distribution: true,
            joint: true,
            ..Default::default()
        };
        let specs = ExplainerSpec::resolve(&names(&["winit"]), &[3], &settings).unwrap();
        assert_eq!(specs[0].name(), "winit_w3_pd_joint_datadist");
        assert_eq!(specs[0].generator_horizon(), None);
        assert_eq!(specs[0].generator_kind(), GeneratorKind::Joint);
    }

    #[test]
    fn test_explain_shapes() {
        let predictor = |x: &Array3<f32>| -> Result<Array2<f32>> {
            let (n, _, len) = x.dim();
            Ok(Array2::from_shape_fn((n, 2), |(i, c)| {
                let v = 1.0 / (1.0 + (-x[[i, 0, len - 1]]).exp());
                if c == 0 { v } else { 1.0 - v }
            }))
        };
        let x = Array3::from_shape_fn((2, 3, 4), |(i, f, t)| (i + f + t) as f32 * 0.2);
        let reference = Array3::from_shape_fn((5, 3, 4), |(j, f, t)| (j * f + t) as f32 * 0.1);

        let sampler = MarginalSampler::new(reference.clone(), MarginalMode::TimeAligned).unwrap();
        let winit: Explainer<TestAutodiffBackend> =
            Explainer::WinIT(WinIT::new(WinITConfig::new(2), Box::new(sampler)).unwrap());
        let explanation = winit.explain("winit_w2_pd", &predictor, &x).unwrap();
        assert_eq!(explanation.importance.dim(), (2, 4, 3));
        assert_eq!(explanation.origin, Some(CounterfactualOrigin::DataDistribution));
        for agg in Aggregation::ALL {
            assert_eq!(explanation.importance_for(agg).dim(), (2, 4, 3));
        }

        let fo: Explainer<TestAutodiffBackend> =
            Explainer::Occlusion(Occlusion::new(OcclusionKind::Fo, reference, 2, 0).unwrap());
        let explanation = fo.explain("fo", &predictor, &x).unwrap();
        assert_eq!(explanation.importance.dim(), (2, 4, 3));
        assert!(explanation.windowed.is_none());
    }
}

//! The pipeline steps.
//!
//! Full-image steps implement [`PipeStep`](super::PipeStep); GrayScale and GammaCorrection
//! additionally implement [`UnitStep`](super::UnitStep) so the driver can fuse them into its
//! final per-pixel pass.

mod autocontrast;
mod autocrop;
mod blur;
mod crop_or_rotate;
mod gamma;
mod grayscale;
mod margin_wrap;
mod rescale;

pub use autocontrast::StepAutoContrast;
pub use autocrop::StepAutoCrop;
pub use blur::StepGaussianBlur;
pub use crop_or_rotate::StepCropOrRotate;
pub use gamma::{StepGammaCorrection, gamma_lut};
pub use grayscale::StepGrayScale;
pub use margin_wrap::StepMarginWrap;
pub use rescale::StepRescale;

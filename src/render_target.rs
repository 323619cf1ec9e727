//! Off-screen render targets and the pool that allocates them.
//!
//! Every buffer, double-buffer half and the postprocessing scene capture is
//! a [`RenderTarget`]: a backend texture that one pass renders into and later
//! passes sample from. Relative targets follow the viewport; absolute
//! targets keep their pixel size for their whole life.

use crate::backend::{
    ApiGeneration, BackendCapabilities, ColorPrecision, DeviceClass, Extent, FilterMode,
    RenderBackend, Sampling, TargetDescriptor, TargetHandle, WrapMode,
};
use crate::error::{BackendError, SandboxError, SandboxResult};
use crate::pass::PassKind;
use crate::size_spec::SizeSpec;

/// Device families whose advertised float support is not trusted.
///
/// These devices report full-float render targets but cannot sustain them,
/// so their precision is forced regardless of negotiated capabilities.
pub const PRECISION_OVERRIDES: &[(DeviceClass, ColorPrecision)] =
    &[(DeviceClass::AppleMobile, ColorPrecision::HalfFloat)];

/// Forced precision for `class`, if the policy table has one.
pub fn precision_override(class: DeviceClass) -> Option<ColorPrecision> {
    PRECISION_OVERRIDES
        .iter()
        .find(|(c, _)| *c == class)
        .map(|(_, p)| *p)
}

/// Picks the color precision for every target from backend capabilities.
///
/// Fails when float textures are missing entirely: feedback buffers have no
/// meaningful fallback to 8-bit storage.
pub fn negotiate_precision(caps: &BackendCapabilities) -> SandboxResult<ColorPrecision> {
    if !caps.float_textures {
        return Err(SandboxError::UnsupportedFloatTextures);
    }

    let negotiated = if caps.float_render_targets && caps.api == ApiGeneration::Modern {
        ColorPrecision::Float
    } else {
        log::warn!(
            "Float render targets unavailable ({:?} API), falling back to half float",
            caps.api
        );
        ColorPrecision::HalfFloat
    };

    match precision_override(caps.device_class) {
        Some(forced) if forced != negotiated => {
            log::info!(
                "Forcing {:?} targets on {:?} device",
                forced,
                caps.device_class
            );
            Ok(forced)
        }
        _ => Ok(negotiated),
    }
}

impl Sampling {
    /// Default sampling for targets owned by a pass of `kind`.
    ///
    /// Buffers tile, so they repeat and filter linearly; everything else
    /// clamps and samples the nearest texel.
    pub fn for_kind(kind: PassKind) -> Self {
        match kind {
            PassKind::Buffer(_) | PassKind::DoubleBuffer(_) => Sampling {
                filter: FilterMode::Linear,
                wrap: WrapMode::Repeat,
            },
            _ => Sampling {
                filter: FilterMode::Nearest,
                wrap: WrapMode::ClampToEdge,
            },
        }
    }
}

/// An off-screen color target owned by exactly one pass.
///
/// Dropping a `RenderTarget` does not free backend memory; owners hand it
/// back through [`release`](Self::release).
#[derive(Debug)]
pub struct RenderTarget {
    handle: TargetHandle,
    label: String,
    spec: SizeSpec,
    size: Extent,
    sampling: Sampling,
    precision: ColorPrecision,
}

impl RenderTarget {
    pub fn handle(&self) -> TargetHandle {
        self.handle
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn spec(&self) -> SizeSpec {
        self.spec
    }

    /// Current pixel size.
    pub fn size(&self) -> Extent {
        self.size
    }

    pub fn sampling(&self) -> Sampling {
        self.sampling
    }

    pub fn precision(&self) -> ColorPrecision {
        self.precision
    }

    pub fn is_relative(&self) -> bool {
        self.spec.is_relative()
    }

    /// Resizes a relative target to its fraction of `viewport`.
    ///
    /// Absolute targets are left alone. Returns whether the backend target
    /// was reallocated.
    pub fn fit_viewport<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        viewport: Extent,
    ) -> Result<bool, BackendError> {
        if !self.is_relative() {
            return Ok(false);
        }
        let size = self.spec.resolve(viewport);
        if size == self.size {
            return Ok(false);
        }
        backend.resize_target(self.handle, size)?;
        self.size = size;
        Ok(true)
    }

    pub(crate) fn release<B: RenderBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_target(self.handle);
    }
}

/// Allocates render targets at one negotiated precision.
#[derive(Debug, Clone, Copy)]
pub struct TargetPool {
    precision: ColorPrecision,
}

impl TargetPool {
    pub fn new(precision: ColorPrecision) -> Self {
        Self { precision }
    }

    /// Negotiates precision from `caps`, see [`negotiate_precision`].
    pub fn negotiate(caps: &BackendCapabilities) -> SandboxResult<Self> {
        negotiate_precision(caps).map(Self::new)
    }

    pub fn precision(&self) -> ColorPrecision {
        self.precision
    }

    /// Creates a target for a pass of `kind` with that kind's default sampling.
    pub fn create<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        label: &str,
        spec: SizeSpec,
        kind: PassKind,
        viewport: Extent,
    ) -> Result<RenderTarget, BackendError> {
        self.create_with(backend, label, spec, Sampling::for_kind(kind), viewport)
    }

    /// Creates a target with explicit sampling.
    pub fn create_with<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        label: &str,
        spec: SizeSpec,
        sampling: Sampling,
        viewport: Extent,
    ) -> Result<RenderTarget, BackendError> {
        let size = spec.resolve(viewport);
        let handle = backend.create_target(&TargetDescriptor {
            label: label.to_string(),
            size,
            precision: self.precision,
            sampling,
        })?;
        log::debug!("Created target '{label}' {}x{} ({spec:?})", size.width, size.height);

        Ok(RenderTarget {
            handle,
            label: label.to_string(),
            spec,
            size,
            sampling,
            precision: self.precision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingBackend;

    fn caps(float_rt: bool, api: ApiGeneration, class: DeviceClass) -> BackendCapabilities {
        BackendCapabilities {
            float_textures: true,
            float_render_targets: float_rt,
            api,
            device_class: class,
        }
    }

    #[test]
    fn full_float_when_supported() {
        let p = negotiate_precision(&caps(true, ApiGeneration::Modern, DeviceClass::Desktop));
        assert_eq!(p.unwrap(), ColorPrecision::Float);
    }

    #[test]
    fn half_float_without_float_targets_or_on_legacy_api() {
        let p = negotiate_precision(&caps(false, ApiGeneration::Modern, DeviceClass::Desktop));
        assert_eq!(p.unwrap(), ColorPrecision::HalfFloat);
        let p = negotiate_precision(&caps(true, ApiGeneration::Legacy, DeviceClass::Desktop));
        assert_eq!(p.unwrap(), ColorPrecision::HalfFloat);
    }

    #[test]
    fn apple_mobile_is_forced_to_half_float() {
        let p = negotiate_precision(&caps(true, ApiGeneration::Modern, DeviceClass::AppleMobile));
        assert_eq!(p.unwrap(), ColorPrecision::HalfFloat);
        assert_eq!(precision_override(DeviceClass::OtherMobile), None);
    }

    #[test]
    fn missing_float_textures_is_fatal() {
        let mut c = caps(true, ApiGeneration::Modern, DeviceClass::Desktop);
        c.float_textures = false;
        assert!(matches!(
            negotiate_precision(&c),
            Err(SandboxError::UnsupportedFloatTextures)
        ));
    }

    #[test]
    fn default_sampling_per_kind() {
        let tiled = Sampling::for_kind(PassKind::DoubleBuffer(0));
        assert_eq!(tiled.wrap, WrapMode::Repeat);
        assert_eq!(tiled.filter, FilterMode::Linear);
        let scene = Sampling::for_kind(PassKind::Postprocessing);
        assert_eq!(scene.wrap, WrapMode::ClampToEdge);
        assert_eq!(scene.filter, FilterMode::Nearest);
    }

    #[test]
    fn relative_target_follows_viewport_and_absolute_does_not() {
        let mut backend = RecordingBackend::default();
        let pool = TargetPool::new(ColorPrecision::Float);
        let viewport = Extent::new(800, 600);

        let mut half = pool
            .create(
                &mut backend,
                "half",
                SizeSpec::from_dimensions(0.5, 0.5),
                PassKind::Buffer(0),
                viewport,
            )
            .unwrap();
        let mut fixed = pool
            .create(
                &mut backend,
                "fixed",
                SizeSpec::from_dimensions(256.0, 128.0),
                PassKind::Buffer(1),
                viewport,
            )
            .unwrap();
        assert_eq!(half.size(), Extent::new(400, 300));
        assert_eq!(fixed.size(), Extent::new(256, 128));

        let resized = half.fit_viewport(&mut backend, Extent::new(1001, 333)).unwrap();
        assert!(resized);
        assert_eq!(half.size(), Extent::new(500, 166));
        assert_eq!(backend.size_of(half.handle()), Extent::new(500, 166));

        assert!(!fixed.fit_viewport(&mut backend, Extent::new(1001, 333)).unwrap());
        assert_eq!(backend.size_of(fixed.handle()), Extent::new(256, 128));
    }

    #[test]
    fn unchanged_size_skips_backend_resize() {
        let mut backend = RecordingBackend::default();
        let pool = TargetPool::new(ColorPrecision::HalfFloat);
        let viewport = Extent::new(64, 64);
        let mut target = pool
            .create(&mut backend, "t", SizeSpec::FULL_VIEWPORT, PassKind::Main, viewport)
            .unwrap();
        backend.clear_calls();
        assert!(!target.fit_viewport(&mut backend, viewport).unwrap());
        assert!(backend.calls.is_empty());
        assert_eq!(target.precision(), ColorPrecision::HalfFloat);
    }
}

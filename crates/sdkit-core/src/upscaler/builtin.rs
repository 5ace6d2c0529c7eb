//! Backends that need no model: the no-op and the plain resampling filters.

use crate::error::Result;

use super::{Upscaler, UpscalerData, UpscalerInit, UpscalerRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughKind {
    None,
    Lanczos,
    Nearest,
}

impl PassthroughKind {
    pub fn name(&self) -> &'static str {
        match self {
            PassthroughKind::None => "None",
            PassthroughKind::Lanczos => "Lanczos",
            PassthroughKind::Nearest => "Nearest",
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PassthroughKind::None => "UpscalerNone",
            PassthroughKind::Lanczos => "UpscalerLanczos",
            PassthroughKind::Nearest => "UpscalerNearest",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Passthrough {
    kind: PassthroughKind,
}

impl Passthrough {
    pub fn new(kind: PassthroughKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> PassthroughKind {
        self.kind
    }
}

impl Upscaler for Passthrough {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn scalers(&self) -> Vec<UpscalerData> {
        vec![UpscalerData::new(self.kind.name(), None)]
    }

    fn is_passthrough(&self) -> bool {
        true
    }
}

fn none(_: &UpscalerInit<'_>) -> Result<Box<dyn Upscaler>> {
    Ok(Box::new(Passthrough::new(PassthroughKind::None)))
}

fn lanczos(_: &UpscalerInit<'_>) -> Result<Box<dyn Upscaler>> {
    Ok(Box::new(Passthrough::new(PassthroughKind::Lanczos)))
}

fn nearest(_: &UpscalerInit<'_>) -> Result<Box<dyn Upscaler>> {
    Ok(Box::new(Passthrough::new(PassthroughKind::Nearest)))
}

pub(super) fn register(registry: &mut UpscalerRegistry) {
    registry.register(PassthroughKind::None.type_name(), none);
    registry.register(PassthroughKind::Lanczos.type_name(), lanczos);
    registry.register(PassthroughKind::Nearest.type_name(), nearest);
}

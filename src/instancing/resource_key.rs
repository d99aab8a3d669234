#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u32);

/// How instances of a group take part in shadow rendering
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShadowCastingMode {
    Off,
    #[default]
    On,
    TwoSided,
    /// Casts shadows but is otherwise invisible
    ShadowsOnly,
}

/// Everything that must match for two instances to share one batched draw
/// call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub geometry: GeometryId,
    pub surface: SurfaceId,
    pub shadow_mode: ShadowCastingMode,
    pub receive_shadows: bool,
    pub layer: u32,
}

impl ResourceKey {
    pub fn new(geometry: GeometryId, surface: SurfaceId) -> Self {
        Self {
            geometry,
            surface,
            shadow_mode: ShadowCastingMode::default(),
            receive_shadows: true,
            layer: 0,
        }
    }

    pub fn with_shadows(mut self, shadow_mode: ShadowCastingMode, receive_shadows: bool) -> Self {
        self.shadow_mode = shadow_mode;
        self.receive_shadows = receive_shadows;
        self
    }

    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }
}

use crate::gpu::{GpuBackend, ProgramHandle, ProgramLocations, QuadGeometry};

pub const POSITION_ATTRIBUTE: &str = "a_position";
pub const TEX_COORD_ATTRIBUTE: &str = "a_tex_coord";
pub const TEXTURE_UNIFORM: &str = "u_texture";

/// Identity-transform vertex shader for the preview quad.
pub const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec3 a_position;
layout(location = 1) in vec2 a_tex_coord;
layout(location = 0) out vec2 v_tex_coord;

void main() {
    gl_Position = vec4(a_position, 1.0);
    v_tex_coord = a_tex_coord;
}
";

/// Samples the bound texture without any colour transform.
pub const FRAGMENT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_tex_coord;
layout(location = 0) out vec4 out_color;

layout(set = 0, binding = 0) uniform texture2D u_texture;
layout(set = 0, binding = 1) uniform sampler u_sampler;

void main() {
    out_color = texture(sampler2D(u_texture, u_sampler), v_tex_coord);
}
";

/// Full-viewport strip: bottom-left, bottom-right, top-left, top-right.
/// Texture row 0 is the top of the image, so `v` runs downwards.
pub const QUAD: QuadGeometry = QuadGeometry {
    positions: [
        -1.0, -1.0, 0.0, //
        1.0, -1.0, 0.0, //
        -1.0, 1.0, 0.0, //
        1.0, 1.0, 0.0,
    ],
    tex_coords: [
        0.0, 1.0, //
        1.0, 1.0, //
        0.0, 0.0, //
        1.0, 0.0,
    ],
};

/// The preview program and the locations resolved from it.
///
/// A failed build yields a program whose handle is [`ProgramHandle::INVALID`];
/// the renderer skips drawing until the next surface generation compiles a
/// fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderProgram {
    handle: ProgramHandle,
    locations: Option<ProgramLocations>,
}

impl ShaderProgram {
    pub fn invalid() -> Self {
        Self {
            handle: ProgramHandle::INVALID,
            locations: None,
        }
    }

    /// Compiles and links the quad shaders. Failures are logged, never retried.
    pub fn compile<B: GpuBackend + ?Sized>(backend: &mut B) -> Self {
        let handle = match backend.compile_program(VERTEX_SHADER_GLSL, FRAGMENT_SHADER_GLSL) {
            Ok(handle) if handle.is_valid() => handle,
            Ok(_) => {
                tracing::error!("backend returned the invalid program handle");
                return Self::invalid();
            }
            Err(error) => {
                tracing::error!(%error, "failed to build preview shader program");
                return Self::invalid();
            }
        };

        let locations = backend
            .attribute_location(handle, POSITION_ATTRIBUTE)
            .zip(backend.attribute_location(handle, TEX_COORD_ATTRIBUTE))
            .zip(backend.uniform_location(handle, TEXTURE_UNIFORM));
        match locations {
            Some(((position, tex_coord), texture)) => {
                tracing::debug!(
                    program = handle.raw(),
                    position,
                    tex_coord,
                    texture,
                    "compiled preview shader program"
                );
                Self {
                    handle,
                    locations: Some(ProgramLocations {
                        position,
                        tex_coord,
                        texture,
                    }),
                }
            }
            None => {
                tracing::error!(
                    program = handle.raw(),
                    "preview shader program is missing an attribute or sampler"
                );
                backend.delete_program(handle);
                Self::invalid()
            }
        }
    }

    pub fn handle(&self) -> ProgramHandle {
        self.handle
    }

    pub fn locations(&self) -> Option<ProgramLocations> {
        self.locations
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_valid() && self.locations.is_some()
    }

    pub fn delete<B: GpuBackend + ?Sized>(self, backend: &mut B) {
        if self.handle.is_valid() {
            backend.delete_program(self.handle);
        }
    }
}

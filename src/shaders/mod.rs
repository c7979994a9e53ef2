//! Embedded engine-internal WGSL shaders (cull compute passes, Hi-Z build,
//! SDSM, deferred passes, sprite batch). Grounded on the teacher's
//! `ShaderAssets` (`renderer/pipeline/shader_manager.rs`): a `RustEmbed`
//! folder baked into the binary. Unlike the teacher's FX shader templates
//! (user content, `#include`d and Jinja-expanded at effect-load time, see
//! [`crate::material::effect`]), these are the engine's own fixed internal
//! passes and need no templating -- they are loaded once, verbatim.

use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "src/shaders/wgsl"]
struct ShaderAssets;

/// Returns the source of an embedded internal shader by file name (e.g.
/// `"cull_visibility.wgsl"`). Panics if the name is not embedded: these are
/// compile-time-known, engine-authored files, not user content.
#[must_use]
pub fn source(name: &str) -> std::borrow::Cow<'static, str> {
    let file = ShaderAssets::get(name).unwrap_or_else(|| panic!("missing embedded shader: {name}"));
    match file.data {
        std::borrow::Cow::Borrowed(bytes) => std::borrow::Cow::Borrowed(
            std::str::from_utf8(bytes).unwrap_or_else(|_| panic!("shader {name} is not valid utf8")),
        ),
        std::borrow::Cow::Owned(bytes) => {
            std::borrow::Cow::Owned(String::from_utf8(bytes).unwrap_or_else(|_| panic!("shader {name} is not valid utf8")))
        }
    }
}

pub fn create_module(device: &wgpu::Device, name: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(name),
        source: wgpu::ShaderSource::Wgsl(source(name)),
    })
}

/// wgpu hands WGSL straight to naga with no preprocessor, so the `common`
/// struct-definition files this engine splits out for readability (e.g.
/// `cull_common.wgsl`) are textually concatenated in front of the pass body
/// here rather than `#include`d.
#[must_use]
pub fn create_module_with_common(device: &wgpu::Device, name: &str, commons: &[&str]) -> wgpu::ShaderModule {
    let mut combined = String::new();
    for common in commons {
        combined.push_str(&source(common));
        combined.push('\n');
    }
    combined.push_str(&source(name));
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(name),
        source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Owned(combined)),
    })
}

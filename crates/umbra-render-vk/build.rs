use std::{env, fs, path::PathBuf};

// Block layouts mirror umbra_render::uniforms; vertex inputs mirror
// umbra_render::Vertex (pos, color, uv, normal at locations 0..3).

const SCENE_VERT: &str = r#"
#version 450
layout(location = 0) in vec3 inPos;
layout(location = 1) in vec3 inColor;
layout(location = 2) in vec2 inUv;
layout(location = 3) in vec3 inNormal;

layout(set = 0, binding = 0) uniform Scene {
    mat4 model;
    mat4 view;
    mat4 proj;
    mat4 projectiveTexture;
    mat4 lightViewProjection;
    vec4 lightDirection;
    vec4 pointLight;
    vec4 lightPosition;
} u;

layout(location = 0) out vec3 vColor;
layout(location = 1) out vec2 vUv;
layout(location = 2) out vec3 vNormal;
layout(location = 3) out vec3 vWorldPos;
layout(location = 4) out vec4 vProjected;
layout(location = 5) out vec4 vLightSpace;
layout(location = 6) out vec3 vLightDirection;
layout(location = 7) out vec4 vPointLight;

void main() {
    vec4 world = u.model * vec4(inPos, 1.0);
    vColor = inColor;
    vUv = inUv;
    vNormal = normalize(mat3(u.model) * inNormal);
    vWorldPos = world.xyz;
    vProjected = u.projectiveTexture * world;
    vLightSpace = u.lightViewProjection * world;
    vLightDirection = u.lightDirection.xyz;
    vPointLight = u.pointLight;
    gl_Position = u.proj * u.view * world;
}
"#;

const SCENE_FRAG: &str = r#"
#version 450
layout(location = 0) in vec3 vColor;
layout(location = 1) in vec2 vUv;
layout(location = 2) in vec3 vNormal;
layout(location = 3) in vec3 vWorldPos;
layout(location = 4) in vec4 vProjected;
layout(location = 5) in vec4 vLightSpace;
layout(location = 6) in vec3 vLightDirection;
layout(location = 7) in vec4 vPointLight;

layout(set = 0, binding = 1) uniform sampler2D colorTexture;
layout(set = 0, binding = 2) uniform Material {
    vec4 ambientColor;
    vec4 lightColor;
    vec4 pointLightColor;
    vec4 pointLightPosition;
    vec4 cameraPosition;
    vec4 specularColor;
    vec4 specular;
} m;
layout(set = 0, binding = 3) uniform sampler2D projectedTexture;
layout(set = 0, binding = 4) uniform sampler2D shadowMap;

layout(location = 0) out vec4 outColor;

const float SHADOWED = 0.35;

float shadowFactor() {
    vec3 ndc = vLightSpace.xyz / vLightSpace.w;
    vec2 uv = ndc.xy * 0.5 + 0.5;
    if (vLightSpace.w <= 0.0 || any(lessThan(uv, vec2(0.0))) || any(greaterThan(uv, vec2(1.0))) || ndc.z > 1.0) {
        return 1.0;
    }
    float closest = texture(shadowMap, uv).r;
    return ndc.z > closest ? SHADOWED : 1.0;
}

void main() {
    vec3 n = normalize(vNormal);
    vec3 toLight = normalize(-vLightDirection);
    vec3 toEye = normalize(m.cameraPosition.xyz - vWorldPos);

    float diffuse = max(dot(n, toLight), 0.0);
    vec3 halfway = normalize(toLight + toEye);
    float highlight = diffuse > 0.0 ? pow(max(dot(n, halfway), 0.0), m.specular.x) : 0.0;

    vec3 toPoint = vPointLight.xyz - vWorldPos;
    float attenuation = clamp(1.0 - length(toPoint) / max(vPointLight.w, 0.0001), 0.0, 1.0);
    float pointDiffuse = max(dot(n, normalize(toPoint)), 0.0) * attenuation;

    vec4 albedo = texture(colorTexture, vUv) * vec4(vColor, 1.0);
    if (vProjected.q > 0.0) {
        albedo *= textureProj(projectedTexture, vProjected);
    }

    float shadow = shadowFactor();
    vec3 lit = m.ambientColor.rgb * m.ambientColor.a
        + shadow * (m.lightColor.rgb * m.lightColor.a * diffuse
                    + m.specularColor.rgb * m.specularColor.a * highlight)
        + m.pointLightColor.rgb * m.pointLightColor.a * pointDiffuse;
    outColor = vec4(albedo.rgb * lit, albedo.a);
}
"#;

const PROXY_VERT: &str = r#"
#version 450
layout(location = 0) in vec3 inPos;
layout(location = 1) in vec3 inColor;

layout(set = 0, binding = 0) uniform Proxy { mat4 mvp; } u;

layout(location = 0) out vec3 vColor;

void main() {
    vColor = inColor;
    gl_Position = u.mvp * vec4(inPos, 1.0);
}
"#;

const PROXY_FRAG: &str = r#"
#version 450
layout(location = 0) in vec3 vColor;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = vec4(vColor, 1.0);
}
"#;

// Depth only; the model matrix arrives as a push constant per draw.
const SHADOW_VERT: &str = r#"
#version 450
layout(location = 0) in vec3 inPos;

layout(set = 0, binding = 0) uniform Shadow { mat4 lightViewProjection; } u;
layout(push_constant) uniform Push { mat4 model; } p;

void main() {
    gl_Position = u.lightViewProjection * p.model * vec4(inPos, 1.0);
}
"#;

const OVERLAY_VERT: &str = r#"
#version 450
layout(push_constant) uniform Push {
    vec2 scale;
    vec2 pad;
    vec4 color;
} p;

const vec2 ARMS[4] = vec2[](vec2(-1.0, 0.0), vec2(1.0, 0.0), vec2(0.0, -1.0), vec2(0.0, 1.0));

void main() {
    gl_Position = vec4(ARMS[gl_VertexIndex] * p.scale, 0.0, 1.0);
}
"#;

const OVERLAY_FRAG: &str = r#"
#version 450
layout(push_constant) uniform Push {
    vec2 scale;
    vec2 pad;
    vec4 color;
} p;

layout(location = 0) out vec4 outColor;

void main() {
    outColor = p.color;
}
"#;

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let shaders = [
        ("scene.vert", SCENE_VERT, shaderc::ShaderKind::Vertex),
        ("scene.frag", SCENE_FRAG, shaderc::ShaderKind::Fragment),
        ("proxy.vert", PROXY_VERT, shaderc::ShaderKind::Vertex),
        ("proxy.frag", PROXY_FRAG, shaderc::ShaderKind::Fragment),
        ("shadow.vert", SHADOW_VERT, shaderc::ShaderKind::Vertex),
        ("overlay.vert", OVERLAY_VERT, shaderc::ShaderKind::Vertex),
        ("overlay.frag", OVERLAY_FRAG, shaderc::ShaderKind::Fragment),
    ];

    for (name, src, kind) in shaders {
        let spv = comp
            .compile_into_spirv(src, kind, name, "main", Some(&opts))
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8()).unwrap();
    }

    // Inline sources live here.
    println!("cargo:rerun-if-changed=build.rs");
}

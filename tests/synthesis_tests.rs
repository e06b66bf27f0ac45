mod common;

use aim_engine::synthesis::{LocalModelCache, NoCache};
use aim_engine::{Backend, ConfigSynthesizer, Precision, ResolutionRequest};
use common::CatalogFixture;
use std::fs;
use tempfile::TempDir;

const RECIPE: &str = r#"
recipe_id: qwen3-32b-bf16
huggingface_id: Qwen/Qwen3-32B
precision: bf16
vllm_serve:
  4_gpu:
    enabled: true
    args:
      model: Qwen/Qwen3-32B
      tensor-parallel-size: 4
      port: 1234
      enable-prefix-caching: true
      enforce-eager: false
      trust-remote-code: "yes"
sglang_serve:
  2_gpu:
    enabled: true
    args:
      model-path: Qwen/Qwen3-32B
      tp: 2
"#;

fn fixture() -> CatalogFixture {
    let fixture = CatalogFixture::new();
    fixture
        .add_model("qwen.yaml", "Qwen/Qwen3-32B", "32B")
        .add_recipe("qwen.yaml", RECIPE);
    fixture
}

#[test]
fn test_vllm_launch_configuration() {
    let fixture = fixture();
    let request = ResolutionRequest::new("Qwen/Qwen3-32B", Backend::Vllm).unwrap();
    let resolved = fixture.resolver(4).resolve(&request).unwrap();

    let config = ConfigSynthesizer::new().synthesize(&resolved, 9000).unwrap();
    assert_eq!(
        config.command,
        "python -m vllm.entrypoints.openai.api_server --model Qwen/Qwen3-32B \
         --tensor-parallel-size 4 --port 9000 --enable-prefix-caching --trust-remote-code"
    );
    assert_eq!(config.environment.get("VLLM_USE_BF16"), Some(&"1".to_string()));
    assert_eq!(
        config.environment.get("VLLM_DISABLE_CUSTOM_ALLREDUCE"),
        Some(&"1".to_string())
    );
    assert_eq!(
        config.environment.get("HF_HUB_TRUST_REMOTE_CODE"),
        Some(&"1".to_string())
    );
    assert_eq!(
        config.environment.get("CUDA_VISIBLE_DEVICES"),
        Some(&"0,1,2,3,4,5,6,7".to_string())
    );
    assert_eq!(
        config.volumes,
        vec![
            "/tmp/.cache:/tmp/.cache".to_string(),
            "~/.cache/huggingface:/root/.cache/huggingface".to_string(),
        ]
    );
}

#[test]
fn test_sglang_launch_configuration() {
    let fixture = fixture();
    let request = ResolutionRequest::new("Qwen/Qwen3-32B", Backend::Sglang).unwrap();
    let resolved = fixture.resolver(2).resolve(&request).unwrap();
    assert_eq!(resolved.precision, Precision::Bf16);

    let config = ConfigSynthesizer::new().synthesize(&resolved, 30000).unwrap();
    assert_eq!(
        config.command,
        "python -m sglang.launch_server --model-path Qwen/Qwen3-32B --tp 2 --port 30000"
    );
    assert!(config.environment.contains_key("SGLANG_DISABLE_CUSTOM_ALLREDUCE"));
    assert!(!config.environment.contains_key("VLLM_DISABLE_CUSTOM_ALLREDUCE"));
    // The vllm slot of the same recipe enables remote code
    assert!(resolved.requires_remote_code);
    assert_eq!(
        config.environment.get("HF_HUB_TRUST_REMOTE_CODE"),
        Some(&"1".to_string())
    );
}

#[test]
fn test_recipe_without_marker_leaves_remote_code_off() {
    let fixture = CatalogFixture::new();
    fixture
        .add_model("m.yaml", "Org/Model-7B", "7B")
        .add_recipe(
            "m.yaml",
            &common::recipe_yaml("m-fp16", "Org/Model-7B", "fp16", "vllm", &[1]),
        );
    let request = ResolutionRequest::new("Org/Model-7B", Backend::Vllm).unwrap();
    let resolved = fixture.resolver(1).resolve(&request).unwrap();

    let config = ConfigSynthesizer::new().synthesize(&resolved, 8000).unwrap();
    assert!(!resolved.requires_remote_code);
    assert!(!config.environment.contains_key("HF_HUB_TRUST_REMOTE_CODE"));
}

#[test]
fn test_cache_layer_merge() {
    let fixture = fixture();
    let request = ResolutionRequest::new("Qwen/Qwen3-32B", Backend::Vllm).unwrap();
    let resolved = fixture.resolver(4).resolve(&request).unwrap();

    let cache_dir = TempDir::new().unwrap();
    fs::write(
        cache_dir.path().join("cache_index.json"),
        r#"{"Qwen/Qwen3-32B": {"cached": true, "size": 65000000000}}"#,
    )
    .unwrap();
    fs::create_dir_all(cache_dir.path().join("models").join("Qwen--Qwen3-32B")).unwrap();
    let cache = LocalModelCache::open(cache_dir.path());

    let synthesizer = ConfigSynthesizer::new();
    let plain = synthesizer
        .synthesize_with_cache(&resolved, 8000, &NoCache)
        .unwrap();
    assert_eq!(plain, synthesizer.synthesize(&resolved, 8000).unwrap());

    let cached = synthesizer
        .synthesize_with_cache(&resolved, 8000, &cache)
        .unwrap();
    assert_eq!(cached.command, plain.command);
    assert_eq!(cached.volumes.len(), plain.volumes.len() + 2);
    assert!(cached.volumes[..2] == plain.volumes[..]);
    assert_eq!(
        cached.environment.get("HF_HOME"),
        Some(&cache_dir.path().display().to_string())
    );
    assert!(cached.environment.contains_key("MODEL_CACHE_PATH"));
    assert_eq!(
        cached.environment.get("PYTHONUNBUFFERED"),
        Some(&"1".to_string())
    );
}

#[test]
fn test_docker_arguments() {
    let fixture = fixture();
    let request = ResolutionRequest::new("Qwen/Qwen3-32B", Backend::Vllm).unwrap();
    let resolved = fixture.resolver(4).resolve(&request).unwrap();
    let config = ConfigSynthesizer::new().synthesize(&resolved, 8000).unwrap();

    let name = resolved.container_name();
    assert_eq!(name, "aim-engine-qwen-qwen3-32b-4gpu-bf16-vllm");

    let args = config.docker_run_args("rocm/vllm:latest", &name, 8000);
    assert_eq!(&args[..4], &["run", "--name", name.as_str(), "-d"]);
    assert!(args.windows(2).any(|w| w[0] == "-p" && w[1] == "8000:8000"));
    assert!(args
        .windows(2)
        .any(|w| w[0] == "-e" && w[1] == "VLLM_USE_BF16=1"));

    let image_at = args.iter().position(|a| a == "rocm/vllm:latest").unwrap();
    assert_eq!(args[image_at + 1..image_at + 4], ["python", "-m", "vllm.entrypoints.openai.api_server"]);
}

mod common;

use aim_engine::catalog::{CatalogError, ModelCatalog, RecipeCatalog};
use aim_engine::{Backend, GpuCount, Precision};
use common::{recipe_yaml, CatalogFixture};

#[test]
fn test_model_catalog_skips_bad_records() {
    let fixture = CatalogFixture::new();
    fixture
        .add_model("a.yaml", "Org/Alpha-7B", "7B")
        .add_model("b.yaml", "not-an-org-id", "7B")
        .add_model("c.yaml", "Org/Alpha-7B", "70B")
        .add_model("d.yaml", "[unclosed", "1B");
    std::fs::write(
        fixture.path().join("models").join("e.json"),
        r#"{"id": "Org/Beta", "size_class": "32B"}"#,
    )
    .unwrap();
    std::fs::write(fixture.path().join("models").join("notes.txt"), "ignored").unwrap();

    let catalog = ModelCatalog::load(&fixture.path().join("models")).unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.size_class("Org/Alpha-7B"), "7B");
    assert_eq!(catalog.size_class("Org/Beta"), "32B");
    assert_eq!(catalog.size_class("Org/Missing"), "unknown");
}

#[test]
fn test_missing_directories_are_empty() {
    let fixture = CatalogFixture::new();
    let catalog = ModelCatalog::load(&fixture.path().join("nope")).unwrap();
    assert!(catalog.is_empty());

    let recipes = RecipeCatalog::new(fixture.path().join("nope"));
    assert!(recipes.load_for_model("Org/Model").unwrap().is_empty());
}

#[test]
fn test_recipe_queries() {
    let fixture = CatalogFixture::new();
    fixture
        .add_recipe(
            "b.yaml",
            &recipe_yaml("model-fp16", "Org/Model", "fp16", "vllm", &[1, 2]),
        )
        .add_recipe(
            "a.yaml",
            &recipe_yaml("model-bf16", "Org/Model", "bf16", "sglang", &[4]),
        )
        .add_recipe(
            "c.yaml",
            &recipe_yaml("other-bf16", "Org/Other", "bf16", "vllm", &[8]),
        )
        .add_recipe("broken.yaml", "recipe_id: [");
    let catalog = RecipeCatalog::new(fixture.path().join("recipes"));

    assert_eq!(
        catalog.recipe_ids("Org/Model").unwrap(),
        vec!["model-bf16".to_string(), "model-fp16".to_string()]
    );
    assert!(catalog.find_recipe("other-bf16").unwrap().is_some());
    assert!(catalog.find_recipe("missing").unwrap().is_none());

    let configs = catalog.supported_configurations("Org/Model").unwrap();
    let summary: Vec<(Backend, Precision, u32)> = configs
        .iter()
        .map(|c| (c.backend, c.precision, c.gpu_count.get()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (Backend::Vllm, Precision::Fp16, 1),
            (Backend::Vllm, Precision::Fp16, 2),
            (Backend::Sglang, Precision::Bf16, 4),
        ]
    );
}

#[test]
fn test_duplicate_enabled_slot_is_an_error() {
    let fixture = CatalogFixture::new();
    fixture
        .add_recipe("a.yaml", &recipe_yaml("first", "Org/Model", "bf16", "vllm", &[2]))
        .add_recipe("b.yaml", &recipe_yaml("second", "Org/Model", "bf16", "vllm", &[2, 4]));
    let catalog = RecipeCatalog::new(fixture.path().join("recipes"));

    match catalog.load_for_model("Org/Model") {
        Err(CatalogError::DuplicateSlot {
            gpu_count,
            first,
            second,
            ..
        }) => {
            assert_eq!(gpu_count, GpuCount::new(2).unwrap());
            assert_eq!(first, "first");
            assert_eq!(second, "second");
        }
        other => panic!("expected DuplicateSlot, got {:?}", other),
    }
}

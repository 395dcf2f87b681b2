//! Rendering context for module prompts.

use serde_json::{Value, json};

use crate::domain::module::WorldModule;
use crate::domain::world::World;

fn fields_view(module: &WorldModule) -> Value {
    let definition = module.definition();
    let fields: Vec<Value> = definition
        .fields
        .iter()
        .filter_map(|field| {
            module.fields.get(field.key).map(|value| {
                json!({
                    "key": field.key,
                    "label": field.label,
                    "value": value,
                })
            })
        })
        .collect();
    Value::Array(fields)
}

/// Builds the template context for generating `target`.
///
/// Siblings are the other modules of the world that are complete or already
/// generated, in registry order.
#[must_use]
pub fn build_generation_context(
    world: &World,
    target: &WorldModule,
    modules: &[WorldModule],
) -> Value {
    let siblings: Vec<Value> = modules
        .iter()
        .filter(|module| module.module_key != target.module_key)
        .filter(|module| module.is_context_eligible())
        .map(|module| {
            json!({
                "key": module.module_key.as_str(),
                "label": module.definition().label,
                "fields": fields_view(module),
                "content": module.full_content,
            })
        })
        .collect();

    json!({
        "world": {
            "name": world.name,
            "tagline": world.tagline,
            "themes": world.themes,
            "creative_intent": world.creative_intent,
            "notes": world.notes,
        },
        "module": {
            "key": target.module_key.as_str(),
            "label": target.definition().label,
            "fields": fields_view(target),
        },
        "siblings": siblings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::module::ModuleStatus;
    use crate::domain::registry::ModuleKey;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn test_context_excludes_partial_siblings_and_target() {
        // Arrange
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let mut world = World::new(Uuid::new_v4(), Uuid::new_v4(), "Aldmere".to_owned(), now);
        world.themes = vec!["decay".to_owned(), "renewal".to_owned()];

        let mut target = WorldModule::new_empty(world.id, ModuleKey::History, now);
        target.status = ModuleStatus::AwaitingGeneration;
        target
            .fields
            .insert("founding".to_owned(), "The city rose from a crater".to_owned());

        let mut completed = WorldModule::new_empty(world.id, ModuleKey::Cosmology, now);
        completed.status = ModuleStatus::Completed;
        completed.full_content = Some("In the beginning there was song.".to_owned());

        let mut partial = WorldModule::new_empty(world.id, ModuleKey::Geography, now);
        partial.status = ModuleStatus::InProgress;
        partial
            .fields
            .insert("climate".to_owned(), "Cold and wet, mostly".to_owned());

        let modules = vec![completed, partial, target.clone()];

        // Act
        let context = build_generation_context(&world, &target, &modules);

        // Assert
        assert_eq!(context["world"]["name"], "Aldmere");
        assert_eq!(context["world"]["themes"][1], "renewal");
        assert_eq!(context["module"]["key"], "history");
        assert_eq!(context["module"]["fields"][0]["label"], "Founding events");

        let siblings = context["siblings"].as_array().unwrap();
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0]["key"], "cosmology");
        assert_eq!(siblings[0]["content"], "In the beginning there was song.");
    }
}

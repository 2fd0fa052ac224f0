fn main() {
    println!("Run `cargo test -p recipe-compat` to execute recipe compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use cake_recipe::{Recipe, RecipeError};
    use cake_remote::types::{MessagePayload, MessageResponse};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (key-order independent).
    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  legacy: {fixture}\n  rust:   {reserialized}"
        );
    }

    // --- Recipe documents ---

    #[test]
    fn fixture_legacy_recipe() {
        roundtrip_test::<Recipe>("legacy_recipe.json");

        let recipe = Recipe::from_json(&read_fixture("legacy_recipe.json")).unwrap();
        recipe.validate().unwrap();
        assert_eq!(recipe.output_file_name(), "holiday.mp4");
        assert_eq!(recipe.recipe_file_name(), "holiday.recipe");
        assert_eq!(recipe.timestamp, 1_700_000_123);
    }

    #[test]
    fn fixture_zero_tail_recipe() {
        roundtrip_test::<Recipe>("zero_tail_recipe.json");

        let recipe = Recipe::from_json(&read_fixture("zero_tail_recipe.json")).unwrap();
        recipe.validate().unwrap();
        assert_eq!(recipe.cake_size, 2);
    }

    #[test]
    fn fixture_unordered_recipe() {
        let recipe = Recipe::from_json(&read_fixture("unordered_recipe.json")).unwrap();
        recipe.validate().unwrap();

        let order: Vec<u64> = recipe.ordered_slices().iter().map(|s| s.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(recipe.slices[0].index, 2, "document order is preserved");
    }

    #[test]
    fn fixture_v1_recipe_is_rejected() {
        let recipe = Recipe::from_json(&read_fixture("v1_recipe.json")).unwrap();
        assert!(matches!(
            recipe.validate(),
            Err(RecipeError::UnsupportedVersion {
                found: 1,
                supported: 2
            })
        ));
    }

    #[test]
    fn written_recipe_keeps_legacy_field_order() {
        let recipe = Recipe::from_json(&read_fixture("legacy_recipe.json")).unwrap();
        let json = recipe.to_json().unwrap();

        let keys = [
            "\"version\"",
            "\"filename\"",
            "\"format\"",
            "\"timestamp\"",
            "\"cake_size\"",
            "\"slices\"",
            "\"checksum_method\"",
            "\"checksum\":",
        ];
        let positions: Vec<usize> = keys
            .iter()
            .map(|k| json.find(k).unwrap_or_else(|| panic!("{k} missing from {json}")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{json}");
        assert_eq!(Recipe::from_json(&json).unwrap(), recipe);
    }

    // --- Channel API ---

    #[test]
    fn fixture_message_response() {
        let response: MessageResponse =
            serde_json::from_value(load_fixture("message_response.json")).unwrap();
        assert_eq!(response.id, "1180000000000000001");
        assert_eq!(
            response.attachment_url(),
            Some("https://cdn.discordapp.com/attachments/1111/1180000000000000002/3.slice")
        );
        assert_eq!(response.attachments[0].size, 8_000_000);
    }

    #[test]
    fn message_payload_shape() {
        let payload = MessagePayload {
            content: "3".into(),
            nonce: "4821937465019283746".into(),
            tts: false,
        };
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"content":"3","nonce":"4821937465019283746","tts":false}"#
        );
    }
}

//! Property tests for scalar writes

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use refpin_yaml::{blocks, parse, ScalarHandle};

const TEMPLATE: &str = "\
# header comment
prod:
  gitConfig:
    ref: PLACEHOLDER   # trailing comment
    path: \"services/api\"
  dockerImage:
    tag: 'quoted'

staging: {}
";

fn handle_for(text: &str, section: &str, key: &str) -> ScalarHandle {
    let file = parse(text).unwrap();
    let doc = file.document().unwrap();
    let top = blocks::top_level_blocks(doc).unwrap();
    let map = blocks::get_mapping(doc, top.get("prod").unwrap(), section)
        .unwrap()
        .unwrap();
    blocks::get_string_and_handle(doc, map, key).unwrap().unwrap().1
}

fn write(text: &str, section: &str, key: &str, value: &str) -> String {
    let handle = handle_for(text, section, key);
    let mut file = parse(text).unwrap();
    file.document_mut().unwrap().write_scalar(handle, value);
    file.serialize()
}

fn read(text: &str, section: &str, key: &str) -> String {
    let value: serde_yaml::Value = serde_yaml::from_str(text).unwrap();
    value["prod"][section][key].as_str().unwrap().to_string()
}

proptest! {
    #[test]
    fn written_strings_read_back_as_strings(value in "[ -~]{0,24}") {
        let fields = [("gitConfig", "ref"), ("gitConfig", "path"), ("dockerImage", "tag")];
        for (section, key) in fields {
            let out = write(TEMPLATE, section, key, &value);
            prop_assert_eq!(read(&out, section, key), value.clone());

            let again = write(&out, section, key, &value);
            prop_assert_eq!(&again, &out);
        }
    }

    #[test]
    fn writes_touch_only_their_line(value in "[a-zA-Z0-9._/-]{1,24}") {
        let out = write(TEMPLATE, "gitConfig", "ref", &value);
        let before: Vec<&str> = TEMPLATE.lines().collect();
        let after: Vec<&str> = out.lines().collect();
        prop_assert_eq!(before.len(), after.len());
        for (idx, (a, b)) in before.iter().zip(&after).enumerate() {
            if idx != 3 {
                prop_assert_eq!(a, b);
            }
        }
        prop_assert!(after[3].ends_with("   # trailing comment"));
    }

    #[test]
    fn numeric_forms_are_single_quoted(
        value in prop_oneof!["0[0-9]{1,12}", "[1-9][0-9]{0,3}(_[0-9]{3}){1,3}", "[-+][0-9]{1,8}"]
    ) {
        let out = write(TEMPLATE, "gitConfig", "ref", &value);
        let expected = format!("    ref: '{value}'   # trailing comment");
        prop_assert!(out.contains(&expected), "{} not quoted in {}", value, out);
        prop_assert_eq!(read(&out, "gitConfig", "ref"), value);
    }
}

#[test]
fn flow_mapping_blocks_are_left_alone() {
    let out = write(TEMPLATE, "dockerImage", "tag", "v2");
    assert!(out.ends_with("staging: {}\n"));
    assert!(out.contains("tag: 'v2'"));
}

//! Register catalog and coordinate offset mapping.

use compwatch_core::{
    catalog::{device_offset, device_offset_span, logical_index, COORDINATE_SYSTEMS},
    CoreError, EntityCode, RegisterCatalog,
};
use rstest::rstest;

#[rstest]
#[case(1, 7)]
#[case(2, 8)]
#[case(10, 16)]
#[case(48, 54)]
fn logical_to_device_offset(#[case] index: u8, #[case] offset: u16) {
    assert_eq!(device_offset(index), Some(offset));
    assert_eq!(logical_index(offset), Some(index));
}

#[test]
fn offset_mapping_is_bijective_over_the_range() {
    for i in COORDINATE_SYSTEMS {
        let offset = device_offset(i).expect("in range");
        assert_eq!(offset, u16::from(i) + 6);
        assert_eq!(logical_index(offset), Some(i));
    }
    assert_eq!(device_offset_span(), (7, 54));
}

#[rstest]
#[case(0)]
#[case(6)]
#[case(55)]
#[case(300)]
fn offsets_outside_span_have_no_logical_index(#[case] offset: u16) {
    assert_eq!(logical_index(offset), None);
}

#[rstest]
#[case(0)]
#[case(49)]
fn indices_outside_range_have_no_offset(#[case] index: u8) {
    assert_eq!(device_offset(index), None);
}

#[test]
fn default_catalog_covers_hundred_tools_and_48_coordinates() {
    let catalog = RegisterCatalog::default();
    assert_eq!(catalog.tools().count(), 100);
    assert_eq!(catalog.coordinates().count(), 48);
    assert_eq!(catalog.entities().count(), 148);
    assert_eq!(catalog.tools().next(), Some(EntityCode::Tool(1)));
    assert_eq!(catalog.coordinates().last(), Some(EntityCode::Coordinate(48)));
}

#[test]
fn entity_keys_are_stable() {
    let catalog = RegisterCatalog::new(1, 3).expect("catalog");
    let keys: Vec<String> = catalog.entities().map(|e| e.to_string()).collect();
    assert_eq!(&keys[..4], &["T1", "T2", "T3", "P1"]);
    assert_eq!(keys.last().map(String::as_str), Some("P48"));
}

#[rstest]
#[case(0, 10)]
#[case(20, 10)]
fn invalid_tool_ranges_are_rejected(#[case] start: u16, #[case] end: u16) {
    assert_eq!(
        RegisterCatalog::new(start, end),
        Err(CoreError::InvalidToolRange { start, end })
    );
}

#[test]
fn contains_respects_configured_tool_span() {
    let catalog = RegisterCatalog::new(10, 20).expect("catalog");
    assert!(catalog.contains(EntityCode::Tool(10)));
    assert!(!catalog.contains(EntityCode::Tool(21)));
    assert!(catalog.contains(EntityCode::Coordinate(48)));
}

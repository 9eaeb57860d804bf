//! Golden Tests for Bundled Interfaces
//!
//! Pins the wire layout and shape of the interfaces shipped with the crate.

use amr_interfaces::codegen::{generate_rust, CodegenOptions};
use amr_interfaces::{bundled, Codec, FieldType, SchemaKind, Value};

// =============================================================================
// Registration
// =============================================================================

#[test]
fn test_bundled_interfaces_register_cleanly() {
    let set = bundled::load().unwrap();

    let expected = [
        "amr_interfaces/msg/Pose2D",
        "amr_interfaces/msg/BatteryInfo",
        "amr_interfaces/msg/RobotStatus",
        "amr_interfaces/msg/VelocityCommand",
        "amr_interfaces/srv/EmergencyStop_Request",
        "amr_interfaces/srv/EmergencyStop_Response",
        "slam_interfaces/msg/MapInfo",
        "slam_interfaces/srv/Mapping_Request",
        "slam_interfaces/srv/Mapping_Response",
        "slam_interfaces/srv/SaveMap_Request",
        "slam_interfaces/srv/SaveMap_Response",
        "slam_interfaces/action/NavigateToPose_Goal",
        "slam_interfaces/action/NavigateToPose_Feedback",
        "slam_interfaces/action/NavigateToPose_Result",
    ];
    for name in expected {
        assert!(set.registry.contains(name), "missing {}", name);
    }
    assert_eq!(set.registry.len(), expected.len());
    assert_eq!(set.services.len(), 3);
    assert_eq!(set.actions.len(), 1);
}

#[test]
fn test_kinds_follow_namespaces() {
    let set = bundled::load().unwrap();
    for entry in set.registry.entries() {
        let namespace = entry.schema.name.split('/').nth(1).unwrap();
        assert_eq!(namespace, entry.schema.kind.namespace(), "{}", entry.schema.name);
    }
    assert_eq!(
        set.registry.lookup("slam_interfaces/action/NavigateToPose_Result").unwrap().kind,
        SchemaKind::ActionResult
    );
}

#[test]
fn test_robot_status_shape() {
    let set = bundled::load().unwrap();
    let status = set.registry.lookup("amr_interfaces/msg/RobotStatus").unwrap();

    let names: Vec<&str> = status.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["state", "pose", "battery", "error_codes", "message"]);

    match &status.field("state").unwrap().field_type {
        FieldType::Enum(def) => {
            assert_eq!(def.name, "RobotState");
            assert_eq!(def.value_of("Fault"), Some(4));
        }
        other => panic!("Expected enum, got {:?}", other),
    }
    assert_eq!(
        set.registry.dependencies("amr_interfaces/msg/RobotStatus"),
        vec!["amr_interfaces/msg/BatteryInfo", "amr_interfaces/msg/Pose2D"]
    );
}

#[test]
fn test_cross_package_reference() {
    let set = bundled::load().unwrap();
    let deps = set.registry.dependencies("slam_interfaces/srv/SaveMap_Response");
    assert!(deps.contains(&"slam_interfaces/msg/MapInfo"));
    assert!(deps.contains(&"amr_interfaces/msg/Pose2D"));
}

// =============================================================================
// Wire Layout
// =============================================================================

#[test]
fn test_battery_info_bytes() {
    let set = bundled::load().unwrap();
    let schema = set.registry.lookup("amr_interfaces/msg/BatteryInfo").unwrap();
    let codec = Codec::new(&set.registry);

    let value = Value::message([("percentage", Value::UInt8(87)), ("is_charging", Value::Bool(true))]);
    assert_eq!(codec.encode(&value, schema).unwrap().as_ref(), &[87, 1]);
}

#[test]
fn test_mapping_request_bytes() {
    let set = bundled::load().unwrap();
    let schema = set.registry.lookup("slam_interfaces/srv/Mapping_Request").unwrap();
    let codec = Codec::new(&set.registry);

    let value = Value::message([("command", Value::Enum(0)), ("map_name", Value::from("warehouse"))]);
    let bytes = codec.encode(&value, schema).unwrap();

    let mut expected = vec![0u8, 9, 0, 0, 0];
    expected.extend_from_slice(b"warehouse");
    assert_eq!(bytes.as_ref(), expected.as_slice());
}

#[test]
fn test_velocity_command_default_duration() {
    let set = bundled::load().unwrap();
    let schema = set.registry.lookup("amr_interfaces/msg/VelocityCommand").unwrap();
    let codec = Codec::new(&set.registry);

    let value = Value::message([("linear", Value::Float32(0.5)), ("angular", Value::Float32(0.0))]);
    let bytes = codec.encode(&value, schema).unwrap();
    assert_eq!(bytes.len(), 12);
    assert_eq!(&bytes[8..], &100u32.to_le_bytes());

    let decoded = codec.decode(&bytes, schema).unwrap();
    assert_eq!(decoded.get("duration_ms"), Some(&Value::UInt32(100)));
}

#[test]
fn test_navigation_status_negative_member() {
    let set = bundled::load().unwrap();
    let schema = set.registry.lookup("slam_interfaces/action/NavigateToPose_Result").unwrap();
    let codec = Codec::new(&set.registry);

    let pose = Value::message([
        ("x", Value::Float64(1.0)),
        ("y", Value::Float64(2.0)),
        ("theta", Value::Float64(0.0)),
    ]);
    let value = Value::message([("status", Value::Enum(-1)), ("final_pose", pose)]);
    let bytes = codec.encode(&value, schema).unwrap();
    assert_eq!(bytes[0], 0xFF);
    assert_eq!(codec.decode(&bytes, schema).unwrap(), value);
}

// =============================================================================
// Hashes and Bindings
// =============================================================================

#[test]
fn test_type_hashes_are_stable_across_loads() {
    let first = bundled::load().unwrap();
    let second = bundled::load().unwrap();
    for entry in first.registry.entries() {
        let other = second.registry.entry(&entry.schema.name).unwrap();
        assert_eq!(entry.type_hash, other.type_hash);
        assert!(entry.type_hash.as_str().starts_with("RIHS01_"));
    }
}

#[test]
fn test_bindings_for_bundled_interfaces() {
    let set = bundled::load().unwrap();
    let output = generate_rust(&set.registry, &CodegenOptions::default());

    assert!(output.code.contains("pub mod amr_interfaces {"));
    assert!(output.code.contains("pub mod slam_interfaces {"));
    assert!(output.code.contains("pub struct RobotStatus {"));
    assert!(output.code.contains("pub struct MappingRequest {"));
    assert!(output.code.contains("pub struct NavigateToPoseGoal {"));
    assert!(output.code.contains("pub enum RobotState {"));
    assert!(output.code.contains("pub origin: super::super::amr_interfaces::msg::Pose2D,"));
    // 14 structs + RobotState, MappingCommand, MappingStatus, NavigationStatus
    assert_eq!(output.type_count, 18);
}

//! Typed ID definitions.

use crate::define_id;

define_id!(AppId, "app", "Identifies an application record.");
define_id!(SpaceId, "spc", "Identifies the space an application belongs to.");
define_id!(
    StagingTaskId,
    "stg",
    "Identifies one staging attempt; correlates a stage request with its completion."
);
define_id!(MessageId, "msg", "Identifies one message published on the bus.");

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_app_id_roundtrip() {
        let id = AppId::new();
        let parsed: AppId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(id.to_string().starts_with("app_"));
    }

    #[test]
    fn test_task_id_rejects_app_prefix() {
        let result: Result<StagingTaskId, _> = "app_01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        let err = result.unwrap_err();
        assert!(err.is_prefix_error());
        assert!(matches!(
            err,
            crate::IdError::InvalidPrefix { expected: "stg", .. }
        ));
    }

    #[test]
    fn test_missing_separator() {
        let result: Result<AppId, _> = "app01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert_eq!(result.unwrap_err(), crate::IdError::MissingSeparator);
    }

    #[test]
    fn test_empty() {
        let result: Result<MessageId, _> = "".parse();
        assert!(result.unwrap_err().is_empty());
    }

    #[test]
    fn test_invalid_ulid() {
        let result: Result<AppId, _> = "app_not-a-ulid".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::InvalidUlid(_)));
    }

    #[test]
    fn test_json_is_plain_string() {
        let id = StagingTaskId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let parsed: StagingTaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_prefixes_unique() {
        let prefixes = [
            AppId::PREFIX,
            SpaceId::PREFIX,
            StagingTaskId::PREFIX,
            MessageId::PREFIX,
        ];
        let unique: std::collections::HashSet<_> = prefixes.iter().collect();
        assert_eq!(prefixes.len(), unique.len(), "Duplicate ID prefixes found!");
    }

    proptest! {
        #[test]
        fn prop_parse_never_accepts_foreign_prefix(prefix in "[a-z]{1,6}") {
            prop_assume!(prefix != AppId::PREFIX);
            let raw = format!("{}_{}", prefix, crate::Ulid::new());
            prop_assert!(AppId::parse(&raw).is_err());
        }
    }
}

use bson::oid::ObjectId;
use bson::Bson;

use crate::error::ServerError;
use crate::model::{Role, ServerSpecificInfo};

/// A single field out of a change stream's `updateDescription.updatedFields`,
/// typed by name. Replaces the original's `map[string]interface{}` switch
/// (`k == "groupID"`, `v.(primitive.ObjectID)`, ...) with a closed enum
/// decoded once per field rather than re-checked ad hoc at every use site.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    GroupId(ObjectId),
    TelegramChatId(i64),
    TotalTx(i64),
    TotalRx(i64),
    AllowedUsage(i64),
    ExpiresAt(i64),
    /// The original explicitly ignores `disabled` updates here — the
    /// peer loop is the sole writer of that field's device-visible
    /// effect, so this consumer only needs to acknowledge it exists.
    Disabled,
    Name(String),
    Role(Role),
    PreferredEndpoint(String),
    /// A remote server's `serverSpecificInfo` entry, pushed as a nested
    /// document rather than a scalar. Only meaningful when its
    /// `address` differs from this server's own.
    RemoteServerSpecificInfo(ServerSpecificInfo),
    /// A field this server has no typed handling for. Not an error —
    /// the document schema is allowed to carry fields this consumer
    /// doesn't react to.
    Unrecognized(String),
}

/// Normalizes a BSON numeric value to `i64` regardless of which
/// integer width (or double) it was encoded in. The original's Go
/// driver always decodes whole numbers as `int64` when the target
/// field is declared `int64`; across a change stream the same document
/// can arrive with `Int32`, `Int64`, or `Double` depending on how the
/// update was issued, so this normalizes before use.
fn as_i64_lossy(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) => Some(*v as i64),
        _ => None,
    }
}

impl TryFrom<(&str, &Bson)> for FieldUpdate {
    type Error = ServerError;

    fn try_from((key, value): (&str, &Bson)) -> Result<Self, Self::Error> {
        let invalid = || ServerError::InvalidQuery(format!("update field {key} has unexpected type"));

        match key {
            "groupID" => {
                let id = value.as_object_id().ok_or_else(invalid)?;
                Ok(Self::GroupId(id))
            },
            "telegramChatID" => as_i64_lossy(value).map(Self::TelegramChatId).ok_or_else(invalid),
            "totalTX" => as_i64_lossy(value).map(Self::TotalTx).ok_or_else(invalid),
            "totalRX" => as_i64_lossy(value).map(Self::TotalRx).ok_or_else(invalid),
            "allowedUsage" => as_i64_lossy(value).map(Self::AllowedUsage).ok_or_else(invalid),
            "expiresAt" => as_i64_lossy(value).map(Self::ExpiresAt).ok_or_else(invalid),
            "disabled" => Ok(Self::Disabled),
            "name" => value.as_str().map(|s| Self::Name(s.to_string())).ok_or_else(invalid),
            "role" => {
                let role: Role = bson::from_bson(value.clone())?;
                Ok(Self::Role(role))
            },
            "preferredEndpoint" => value
                .as_str()
                .map(|s| Self::PreferredEndpoint(s.to_string()))
                .ok_or_else(invalid),
            _ if key.starts_with("serverSpecificInfo") && value.as_document().is_some() => {
                let ssi: ServerSpecificInfo = bson::from_bson(value.clone())?;
                Ok(Self::RemoteServerSpecificInfo(ssi))
            },
            other => Ok(Self::Unrecognized(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn decodes_numeric_width_variants() {
        for bson in [Bson::Int32(42), Bson::Int64(42), Bson::Double(42.0)] {
            let field = FieldUpdate::try_from(("allowedUsage", &bson)).unwrap();
            assert_eq!(field, FieldUpdate::AllowedUsage(42));
        }
    }

    #[test]
    fn decodes_remote_ssi_document() {
        let doc = Bson::Document(doc! {
            "address": "1.2.3.4",
            "lastHandshakeTime": "5s",
            "endpoint": "1.2.3.4:51820",
            "currentTX": 10_i64,
            "currentRX": 20_i64,
        });
        match FieldUpdate::try_from(("serverSpecificInfo.1", &doc)).unwrap() {
            FieldUpdate::RemoteServerSpecificInfo(ssi) => assert_eq!(ssi.address, "1.2.3.4"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn passes_through_unrecognized_fields() {
        let bson = Bson::String("whatever".into());
        assert_eq!(
            FieldUpdate::try_from(("somethingElse", &bson)).unwrap(),
            FieldUpdate::Unrecognized("somethingElse".into())
        );
    }

    #[test]
    fn disabled_updates_are_acknowledged_not_errors() {
        let bson = Bson::Boolean(true);
        assert_eq!(FieldUpdate::try_from(("disabled", &bson)).unwrap(), FieldUpdate::Disabled);
    }
}

//! Bet model and its wire representation.

use crate::config::ProtocolConfig;
use crate::error::LineError;
use csv::StringRecord;

/// Number of values on a source line: name, last name, document, birthdate, number.
pub const SOURCE_FIELDS: usize = 5;

/// Number of values in a serialized bet (the agency is prepended).
pub const WIRE_FIELDS: usize = 6;

/// A single lottery bet placed at an agency.
///
/// The agency comes from the client configuration; every other field is read
/// from one line of the bets source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    /// Agency (client id) the bet was placed at
    pub agency: String,

    /// Bettor's first name
    pub name: String,

    /// Bettor's last name
    pub last_name: String,

    /// Bettor's identity document
    pub document: String,

    /// Bettor's birthdate, as written in the source
    pub birthdate: String,

    /// Number the bettor picked
    pub number: u32,
}

impl Bet {
    pub fn new(
        agency: impl Into<String>,
        name: impl Into<String>,
        last_name: impl Into<String>,
        document: impl Into<String>,
        birthdate: impl Into<String>,
        number: u32,
    ) -> Self {
        Bet {
            agency: agency.into(),
            name: name.into(),
            last_name: last_name.into(),
            document: document.into(),
            birthdate: birthdate.into(),
            number,
        }
    }

    /// Builds a bet from one parsed source line.
    ///
    /// The record must carry exactly [`SOURCE_FIELDS`] values. Values are
    /// expected to be trimmed already. A value containing one of the
    /// protocol's separators or the message delimiter is rejected, since it
    /// could not be told apart on the wire.
    pub fn from_source_record(
        agency: &str,
        record: &StringRecord,
        protocol: &ProtocolConfig,
    ) -> Result<Self, LineError> {
        if record.len() != SOURCE_FIELDS {
            return Err(LineError::FieldCount {
                expected: SOURCE_FIELDS,
                got: record.len(),
            });
        }

        let bet = Bet::new(
            agency,
            required(record, 0, "name", protocol)?,
            required(record, 1, "last_name", protocol)?,
            required(record, 2, "document", protocol)?,
            required(record, 3, "birthdate", protocol)?,
            parse_number(&record[4])?,
        );
        Ok(bet)
    }

    /// Returns `true` if every text field is present and the number is positive.
    pub fn is_valid(&self) -> bool {
        !self.agency.is_empty()
            && !self.name.is_empty()
            && !self.last_name.is_empty()
            && !self.document.is_empty()
            && !self.birthdate.is_empty()
            && self.number > 0
    }

    /// Serializes the bet as `agency;name;last_name;document;birthdate;number`
    /// using the given field separator.
    pub fn serialize(&self, field_separator: &str) -> String {
        let number = self.number.to_string();
        [
            self.agency.as_str(),
            self.name.as_str(),
            self.last_name.as_str(),
            self.document.as_str(),
            self.birthdate.as_str(),
            number.as_str(),
        ]
        .join(field_separator)
    }

    /// Parses the output of [`Bet::serialize`].
    pub fn deserialize(data: &str, field_separator: &str) -> Result<Self, LineError> {
        let parts: Vec<&str> = data.split(field_separator).collect();
        if parts.len() != WIRE_FIELDS {
            return Err(LineError::FieldCount {
                expected: WIRE_FIELDS,
                got: parts.len(),
            });
        }

        let number = parse_number(parts[5])?;
        Ok(Bet::new(parts[0], parts[1], parts[2], parts[3], parts[4], number))
    }
}

fn required(
    record: &StringRecord,
    index: usize,
    field: &'static str,
    protocol: &ProtocolConfig,
) -> Result<String, LineError> {
    let value = match record.get(index) {
        Some(value) if !value.is_empty() => value,
        _ => return Err(LineError::MissingField(field)),
    };

    if let Some(token) = reserved_token(value, protocol) {
        return Err(LineError::ReservedToken {
            field,
            token: token.to_string(),
        });
    }
    Ok(value.to_string())
}

/// Returns the first protocol token found inside `value`, if any.
pub(crate) fn reserved_token<'a>(value: &str, protocol: &'a ProtocolConfig) -> Option<&'a str> {
    [
        protocol.field_separator.as_str(),
        protocol.batch_separator.as_str(),
        protocol.message_delimiter.as_str(),
    ]
    .into_iter()
    .find(|token| !token.is_empty() && value.contains(token))
}

/// Parses a positive base-10 pick.
fn parse_number(raw: &str) -> Result<u32, LineError> {
    let trimmed = raw.trim();
    match trimmed.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(LineError::InvalidNumber(trimmed.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Bet {
        Bet::new("1", "Santiago", "Lorca", "30904465", "1999-03-17", 7574)
    }

    #[test]
    fn test_serialize_field_order() {
        assert_eq!(
            sample().serialize(";"),
            "1;Santiago;Lorca;30904465;1999-03-17;7574"
        );
    }

    #[test]
    fn test_deserialize_inverts_serialize() {
        let bet = sample();
        let parsed = Bet::deserialize(&bet.serialize(";"), ";").unwrap();
        assert_eq!(parsed, bet);

        let parsed = Bet::deserialize(&bet.serialize("|"), "|").unwrap();
        assert_eq!(parsed, bet);
    }

    #[test]
    fn test_deserialize_rejects_wrong_part_count() {
        let err = Bet::deserialize("1;Santiago;Lorca;30904465;7574", ";").unwrap_err();
        assert_eq!(err, LineError::FieldCount { expected: 6, got: 5 });
    }

    #[test]
    fn test_from_source_record() {
        let record = StringRecord::from(vec!["Ana", "Perez", "123", "2000-01-01", "42"]);
        let bet = Bet::from_source_record("3", &record, &ProtocolConfig::default()).unwrap();
        assert_eq!(bet, Bet::new("3", "Ana", "Perez", "123", "2000-01-01", 42));
        assert!(bet.is_valid());
    }

    #[test]
    fn test_from_source_record_rejects_bad_number() {
        for raw in ["0", "-5", "abc", "4.5", ""] {
            let record = StringRecord::from(vec!["Ana", "Perez", "123", "2000-01-01", raw]);
            assert!(
                matches!(
                    Bet::from_source_record("3", &record, &ProtocolConfig::default()),
                    Err(LineError::InvalidNumber(_))
                ),
                "number {:?} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_from_source_record_rejects_missing_field() {
        let record = StringRecord::from(vec!["Ana", "", "123", "2000-01-01", "42"]);
        assert_eq!(
            Bet::from_source_record("3", &record, &ProtocolConfig::default()),
            Err(LineError::MissingField("last_name"))
        );
    }

    #[test]
    fn test_from_source_record_rejects_protocol_tokens() {
        let protocol = ProtocolConfig::default();

        let record = StringRecord::from(vec!["Ana;Maria", "Perez", "1", "2000-01-01", "5"]);
        assert_eq!(
            Bet::from_source_record("3", &record, &protocol),
            Err(LineError::ReservedToken {
                field: "name",
                token: ";".to_string()
            })
        );

        let record = StringRecord::from(vec!["B", "C~D", "2", "2000-01-01", "6"]);
        assert_eq!(
            Bet::from_source_record("3", &record, &protocol),
            Err(LineError::ReservedToken {
                field: "last_name",
                token: "~".to_string()
            })
        );

        let record = StringRecord::from(vec!["B", "C", "2\n3", "2000-01-01", "6"]);
        assert_eq!(
            Bet::from_source_record("3", &record, &protocol),
            Err(LineError::ReservedToken {
                field: "document",
                token: "\n".to_string()
            })
        );

        let record = StringRecord::from(vec!["Ana;Maria", "Perez", "1", "2000-01-01", "5"]);
        let custom = ProtocolConfig {
            field_separator: "|".to_string(),
            ..ProtocolConfig::default()
        };
        let bet = Bet::from_source_record("3", &record, &custom).unwrap();
        assert_eq!(bet.name, "Ana;Maria");
    }

    #[test]
    fn test_accepted_record_survives_wire_round_trip() {
        let protocol = ProtocolConfig::default();
        let record = StringRecord::from(vec!["Ana Maria", "Perez-Diaz", "1", "2000-01-01", "5"]);
        let bet = Bet::from_source_record("3", &record, &protocol).unwrap();

        let wire = bet.serialize(&protocol.field_separator);
        assert_eq!(Bet::deserialize(&wire, &protocol.field_separator), Ok(bet));
    }

    #[test]
    fn test_is_valid_requires_agency() {
        let bet = Bet::new("", "Ana", "Perez", "123", "2000-01-01", 42);
        assert!(!bet.is_valid());
    }
}

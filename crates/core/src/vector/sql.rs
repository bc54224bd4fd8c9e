//! `SELECT` statements over a single layer

use crate::error::{Error, Result};
use crate::vector::filter::{Expr, Parser};

/// Parsed `SELECT <* | field, ...> FROM layer [WHERE expr]`
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// Selected fields; empty means `*`
    pub fields: Vec<String>,
    pub layer: String,
    pub filter: Option<Expr>,
}

impl SelectStatement {
    pub fn parse(text: &str) -> Result<Self> {
        let mut parser = Parser::new(text)?;

        if !parser.keyword("SELECT") {
            return Err(Error::ExpressionParse(format!(
                "expected SELECT statement, got \"{}\"",
                text
            )));
        }

        let mut fields = Vec::new();
        if !parser.star() {
            loop {
                fields.push(parser.identifier("field name")?);
                if !parser.comma() {
                    break;
                }
            }
        }

        if !parser.keyword("FROM") {
            return Err(Error::ExpressionParse("expected FROM".into()));
        }
        let layer = parser.identifier("layer name")?;

        let filter = if parser.keyword("WHERE") {
            Some(parser.expression()?)
        } else {
            None
        };
        parser.finish()?;

        Ok(Self {
            fields,
            layer,
            filter,
        })
    }

    /// Whether every field is selected
    pub fn selects_all(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check selected fields and the filter against a layer schema.
    ///
    /// Returns the statement with field names rewritten to the schema's
    /// spelling.
    pub fn bind(self, schema: &[String]) -> Result<Self> {
        let fields = self
            .fields
            .into_iter()
            .map(|f| {
                schema
                    .iter()
                    .find(|s| s.eq_ignore_ascii_case(&f))
                    .cloned()
                    .ok_or(Error::FieldNotFound(f))
            })
            .collect::<Result<Vec<_>>>()?;
        let filter = self.filter.map(|e| e.bind(schema)).transpose()?;
        Ok(Self {
            fields,
            layer: self.layer,
            filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_star() {
        let stmt = SelectStatement::parse("SELECT * FROM test").unwrap();
        assert!(stmt.selects_all());
        assert_eq!(stmt.layer, "test");
        assert!(stmt.filter.is_none());
    }

    #[test]
    fn test_select_fields_with_where() {
        let stmt = SelectStatement::parse("select a, \"B c\" from pts where a > 1").unwrap();
        assert_eq!(stmt.fields, vec!["a", "B c"]);
        assert_eq!(stmt.layer, "pts");
        assert!(stmt.filter.is_some());
    }

    #[test]
    fn test_invalid_statement() {
        let err = SelectStatement::parse("invalid").unwrap_err();
        assert!(err.to_string().starts_with("SQL Expression Parsing Error"));
        assert!(SelectStatement::parse("SELECT * FROM").is_err());
        assert!(SelectStatement::parse("SELECT * FROM t WHERE").is_err());
        assert!(SelectStatement::parse("SELECT * FROM t extra").is_err());
    }

    #[test]
    fn test_bind() {
        let schema = vec!["Elev".to_string()];
        let stmt = SelectStatement::parse("SELECT elev FROM t WHERE elev > 0")
            .unwrap()
            .bind(&schema)
            .unwrap();
        assert_eq!(stmt.fields, vec!["Elev"]);

        let err = SelectStatement::parse("SELECT depth FROM t")
            .unwrap()
            .bind(&schema)
            .unwrap_err();
        assert!(matches!(err, Error::FieldNotFound(_)));
    }
}

use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

/// Tables the language model may query. Relationships are implied by the shared
/// `phone` column only and are never enforced.
pub const TABLES: &[TableSchema] = &[
    TableSchema {
        name: "customers",
        columns: &["phone", "name", "city", "total_spend"],
    },
    TableSchema {
        name: "order_items",
        columns: &["order_id", "phone", "sku", "qty", "price", "order_date"],
    },
];

#[derive(Debug, Clone, Copy)]
pub struct DbSchema {
    pub tables: &'static [TableSchema],
}

impl Default for DbSchema {
    fn default() -> Self {
        Self { tables: TABLES }
    }
}

impl Display for TableSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.columns.join(", "))
    }
}

impl Display for DbSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Tables:")?;
        for table in self.tables {
            writeln!(f, "- {table}")?;
        }
        Ok(())
    }
}

pub fn describe() -> String {
    DbSchema::default().to_string()
}

//! Schema validation: the required columns are located once, from the header.

use fanout_shared::{ColumnIndex, FanoutError, Header, Result, SchemaConfig};

/// Positions of the three columns every record is read through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPositions {
    pub id: usize,
    pub count: usize,
    pub rate: usize,
}

/// Validated input schema, shared read-only by all workers.
#[derive(Debug, Clone)]
pub struct Schema {
    header: Header,
    positions: FieldPositions,
    names: SchemaConfig,
    output_header: Header,
}

impl Schema {
    /// Build the column index and check that every required column exists.
    ///
    /// Fails with [`FanoutError::Schema`] naming the first missing column.
    pub fn from_header(header: Header, config: &SchemaConfig) -> Result<Self> {
        let index = ColumnIndex::from_header(&header);

        for column in config.required_columns() {
            if !index.contains(column) {
                return Err(FanoutError::schema(column));
            }
        }

        let position = |column: &str| index.get(column).ok_or_else(|| FanoutError::schema(column));
        let positions = FieldPositions {
            id: position(&config.id_column)?,
            count: position(&config.count_column)?,
            rate: position(&config.rate_column)?,
        };

        let output_header = header.with_appended(&config.result_column);

        Ok(Self {
            header,
            positions,
            names: config.clone(),
            output_header,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn positions(&self) -> FieldPositions {
        self.positions
    }

    /// Configured column names, used when reporting a bad field.
    pub fn names(&self) -> &SchemaConfig {
        &self.names
    }

    /// Header of the success artifacts: input columns plus the result column.
    pub fn output_header(&self) -> &Header {
        &self.output_header
    }
}

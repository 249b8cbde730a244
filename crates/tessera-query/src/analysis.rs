//! Analyzed statements and the schema they were resolved against

use crate::error::{QueryError, Result};
use crate::statement::{Compressor, DataType, Encoding, Statement};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_core::PartialPath;

/// Schema of one measurement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementSchema {
    pub measurement: String,
    pub data_type: DataType,
    pub encoding: Encoding,
    pub compressor: Compressor,
}

impl MeasurementSchema {
    pub fn new(measurement: impl Into<String>, data_type: DataType) -> Self {
        Self {
            measurement: measurement.into(),
            data_type,
            encoding: Encoding::Plain,
            compressor: Compressor::Snappy,
        }
    }
}

/// Measurement schemas fetched for a statement, grouped by device
#[derive(Debug, Clone, Default)]
pub struct SchemaTree {
    devices: BTreeMap<PartialPath, BTreeMap<String, MeasurementSchema>>,
}

impl SchemaTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_schema(&mut self, device: &PartialPath, schema: MeasurementSchema) {
        self.devices
            .entry(device.clone())
            .or_default()
            .insert(schema.measurement.clone(), schema);
    }

    /// Schemas of `measurements` under `device`, in request order
    pub fn search_measurement_schema(
        &self,
        device: &PartialPath,
        measurements: &[String],
    ) -> Result<Vec<MeasurementSchema>> {
        let known = self
            .devices
            .get(device)
            .ok_or_else(|| QueryError::Planning(format!("no schema fetched for device {}", device)))?;
        measurements
            .iter()
            .map(|m| {
                known
                    .get(m)
                    .cloned()
                    .ok_or_else(|| QueryError::Planning(format!("unknown measurement {}.{}", device, m)))
            })
            .collect()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

/// A statement together with everything analysis resolved for it
#[derive(Debug, Clone)]
pub struct Analysis {
    statement: Statement,
    schema_tree: SchemaTree,
}

impl Analysis {
    pub fn new(statement: Statement) -> Self {
        Self {
            statement,
            schema_tree: SchemaTree::new(),
        }
    }

    pub fn with_schema_tree(mut self, schema_tree: SchemaTree) -> Self {
        self.schema_tree = schema_tree;
        self
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn schema_tree(&self) -> &SchemaTree {
        &self.schema_tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_measurement_schema() {
        let device = PartialPath::new("root.sg.d1").unwrap();
        let mut tree = SchemaTree::new();
        tree.append_schema(&device, MeasurementSchema::new("s1", DataType::Int64));
        tree.append_schema(&device, MeasurementSchema::new("s2", DataType::Boolean));

        let found = tree
            .search_measurement_schema(&device, &["s2".to_string(), "s1".to_string()])
            .unwrap();
        assert_eq!(found[0].data_type, DataType::Boolean);
        assert_eq!(found[1].measurement, "s1");

        assert!(tree
            .search_measurement_schema(&device, &["s3".to_string()])
            .is_err());
        assert!(tree
            .search_measurement_schema(&PartialPath::new("root.sg.d2").unwrap(), &[])
            .is_err());
    }
}

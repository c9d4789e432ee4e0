use crosswind_core::types::StreamData;

use crate::datastream::DataStream;

/// Entry point for building pipelines.
pub struct StreamExecutionEnvironment {
    job_name: String,
}

impl StreamExecutionEnvironment {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Create a bounded stream from an iterator of records.
    pub fn from_iter<T, I>(&self, source: I) -> DataStream<T>
    where
        T: StreamData,
        I: IntoIterator<Item = T>,
    {
        tracing::info!(job = %self.job_name, "creating source stream");
        DataStream {
            source_data: source.into_iter().collect(),
        }
    }
}

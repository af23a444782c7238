//! `SearchScanExec`: the leaf execution plan behind [`SearchTable`](crate::table::SearchTable).
//!
//! The upstream scan is deferred until the returned stream is polled. It
//! runs to completion into a [`ScanBuffer`], which is then drained in
//! session-sized batches.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use datafusion::error::{DataFusionError, Result as DFResult};
use datafusion::execution::TaskContext;
use datafusion::physical_expr::EquivalenceProperties;
use datafusion::physical_plan::execution_plan::{Boundedness, EmissionType};
use datafusion::physical_plan::stream::RecordBatchStreamAdapter;
use datafusion::physical_plan::{
    DisplayAs, DisplayFormatType, ExecutionPlan, Partitioning, PlanProperties,
    SendableRecordBatchStream,
};
use futures::TryStreamExt;

use crate::pagination::run_scan;
use crate::request::SearchRequest;
use crate::sink::ScanBuffer;
use crate::transport::Transport;

#[derive(Debug)]
pub struct SearchScanExec {
    request: SearchRequest,
    transport: Transport,
    projection: Option<Vec<usize>>,
    schema: SchemaRef,
    properties: PlanProperties,
}

impl SearchScanExec {
    pub fn try_new(
        request: SearchRequest,
        transport: Transport,
        projection: Option<Vec<usize>>,
    ) -> DFResult<Self> {
        let schema = ScanBuffer::new(request.kind, projection.clone())?.schema();
        let properties = PlanProperties::new(
            EquivalenceProperties::new(Arc::clone(&schema)),
            Partitioning::UnknownPartitioning(1),
            EmissionType::Final,
            Boundedness::Bounded,
        );
        Ok(Self {
            request,
            transport,
            projection,
            schema,
            properties,
        })
    }
}

impl ExecutionPlan for SearchScanExec {
    fn name(&self) -> &str {
        "SearchScanExec"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn properties(&self) -> &PlanProperties {
        &self.properties
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![]
    }

    fn with_new_children(
        self: Arc<Self>,
        children: Vec<Arc<dyn ExecutionPlan>>,
    ) -> DFResult<Arc<dyn ExecutionPlan>> {
        if children.is_empty() {
            Ok(self)
        } else {
            Err(DataFusionError::Internal(
                "SearchScanExec is a leaf node and cannot have children".to_string(),
            ))
        }
    }

    fn execute(
        &self,
        partition: usize,
        context: Arc<TaskContext>,
    ) -> DFResult<SendableRecordBatchStream> {
        if partition != 0 {
            return Err(DataFusionError::Internal(format!(
                "SearchScanExec only supports partition 0, got {}",
                partition
            )));
        }

        let request = self.request.clone();
        let transport = self.transport.clone();
        let buffer = ScanBuffer::new(request.kind, self.projection.clone())?;
        let batch_size = context.session_config().batch_size();

        let stream = futures::stream::once(async move {
            let records = run_scan(&request, &transport).await?;
            buffer.fill(records)?;
            let batches = buffer.drain_all(batch_size)?;
            Ok::<_, DataFusionError>(futures::stream::iter(batches.into_iter().map(Ok)))
        })
        .try_flatten();

        Ok(Box::pin(RecordBatchStreamAdapter::new(
            Arc::clone(&self.schema),
            stream,
        )))
    }
}

impl DisplayAs for SearchScanExec {
    fn fmt_as(&self, _t: DisplayFormatType, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SearchScanExec: kind={}, query={:?}, row_cap={}",
            self.request.kind, self.request.phrase, self.request.row_cap
        )?;
        let filters = &self.request.filters;
        if !filters.site_includes.is_empty() {
            write!(f, ", sites=[{}]", filters.site_includes.join(", "))?;
        }
        if !filters.site_excludes.is_empty() {
            write!(f, ", excluded=[{}]", filters.site_excludes.join(", "))?;
        }
        if let Some(sort) = &filters.sort {
            write!(f, ", sort={}", sort)?;
        }
        Ok(())
    }
}

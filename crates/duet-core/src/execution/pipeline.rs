//! Query-to-pipeline glue

use super::{
    CollectStage, FilterStage, InterpContext, ProjectionStage, QueryResult, ScanStage,
    SemiJoinStage, Stage,
};
use crate::error::{Error, Result};
use crate::jit::{CodegenContext, FnBuilder};
use crate::query::{QueryPlan, Selection};
use crate::storage::{Catalog, Column, Relation};
use cranelift::prelude::*;
use tracing::debug;

/// One query's scan plus its stage chain, ending in the projection
///
/// Borrows the catalog and the membership indexes of the plan; the borrow
/// checker keeps both alive for as long as the pipeline, and any function
/// compiled from it, exists.
#[derive(Debug)]
pub struct Pipeline<'a> {
    scan: ScanStage,
    stages: Vec<Stage<'a>>,
}

fn resolve<'a>(relations: &[&'a Relation], selection: Selection) -> Result<(&'a Column, usize)> {
    let relation = relations.get(selection.binding).ok_or_else(|| {
        Error::plan(format!(
            "selection {selection} refers to binding {} of {}",
            selection.binding,
            relations.len()
        ))
    })?;
    Ok((relation.column(selection.column)?, selection.binding))
}

impl<'a> Pipeline<'a> {
    /// Resolve `plan` against `catalog` and chain its stages
    ///
    /// Every binding, column and collected slot is checked here; nothing
    /// can fail per row afterwards.
    pub fn build(catalog: &'a Catalog, plan: &QueryPlan<'a>) -> Result<Self> {
        if plan.bindings.is_empty() {
            return Err(Error::plan("query has no bindings"));
        }
        let relations = plan
            .bindings
            .iter()
            .map(|&id| catalog.relation(id))
            .collect::<Result<Vec<_>>>()?;

        let mut stages = Vec::with_capacity(
            plan.filters.len() + plan.semi_joins.len() + plan.collect.iter().len() + 1,
        );
        for filter in &plan.filters {
            let (column, slot) = resolve(&relations, filter.selection)?;
            stages.push(Stage::Filter(FilterStage::new(
                column,
                slot,
                filter.op,
                filter.constant,
            )));
        }
        for semi_join in &plan.semi_joins {
            let (probe, slot) = resolve(&relations, semi_join.probe)?;
            stages.push(Stage::SemiJoin(SemiJoinStage::new(probe, slot, semi_join.index)));
        }
        if let Some(slot) = plan.collect {
            if slot >= relations.len() {
                return Err(Error::plan(format!(
                    "collect refers to binding {slot} of {}",
                    relations.len()
                )));
            }
            stages.push(Stage::Collect(CollectStage::new(slot)));
        }
        let projections = plan
            .projections
            .iter()
            .map(|&selection| resolve(&relations, selection))
            .collect::<Result<Vec<_>>>()?;
        stages.push(Stage::Projection(ProjectionStage::new(projections)));

        let scan = ScanStage::new(relations.iter().map(|r| r.num_tuples()).collect());
        debug!(
            "Built pipeline: {} bindings, {} stages, {} combinations",
            scan.slots(),
            stages.len(),
            scan.combinations()
        );
        Ok(Self { scan, stages })
    }

    /// The scan driving the chain
    pub fn scan(&self) -> &ScanStage {
        &self.scan
    }

    /// The chain, head first
    pub fn stages(&self) -> &[Stage<'a>] {
        &self.stages
    }

    /// First stage the scan dispatches to (the projection when nothing else
    /// is chained)
    pub fn head(&self) -> &Stage<'a> {
        &self.stages[0]
    }

    /// The terminal stage
    pub fn projection(&self) -> &ProjectionStage<'a> {
        match self.stages.last() {
            Some(Stage::Projection(projection)) => projection,
            _ => unreachable!("pipeline always ends with a projection"),
        }
    }

    /// Row ids gathered by the collect stage, if any
    pub fn collected_rows(&self) -> Option<&[u64]> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::Collect(collect) => Some(collect.rows().as_slice()),
            _ => None,
        })
    }

    /// Interpret the whole query
    ///
    /// The pipeline is one-shot: running it twice accumulates twice.
    pub fn execute(&mut self) {
        let mut ctx = InterpContext::new(self.scan.slots());
        self.scan.execute(&mut ctx, &mut self.stages);
    }

    /// Emit the whole query body and return the match counter value
    ///
    /// `results` is the output buffer argument; the final sums are pushed
    /// onto it after the row loops.
    pub fn codegen(&self, fb: &mut FnBuilder<'_>, results: Value) -> Result<Value> {
        let projection = self.projection();
        let mut ctx = CodegenContext::new(fb, self.scan.slots(), projection.width(), results);
        self.scan.codegen(fb, &mut ctx, &self.stages)?;
        projection.codegen_save(fb, &ctx)?;
        Ok(fb.use_var(ctx.amount))
    }

    /// Interpreted result (sums and counter of the projection)
    pub fn result(&self) -> QueryResult {
        let projection = self.projection();
        QueryResult::new(
            projection.sums().to_vec(),
            projection.amount(),
            self.collected_rows().map(<[u64]>::to_vec),
        )
    }
}

//! The fork-join element loop.
mod entity;
mod shared;

pub use entity::{EntityData, EntitySource, VariableData};
pub use shared::SharedAccumulator;

use crate::objects::{EvaluationContext, ObjectWarehouse};
use crate::properties::{PropertyLayout, PropertyStore, SpatialClass, StatefulRecord, StatefulStorage};
use crate::tags::{LocalAssembly, TagRegistry, TaggedContributions, TaggedStorage, TaggingAssembler};
use crate::{EntityId, Real};
use eyre::{eyre, WrapErr};
use itertools::izip;
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use thread_local::ThreadLocal;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Number of worker threads. Zero lets the thread pool decide.
    pub num_threads: usize,
    /// Entities are never split into chunks shorter than this.
    pub min_chunk_len: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            num_threads: 0,
            min_chunk_len: 1,
        }
    }
}

/// What an element loop computes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evaluation {
    Residual,
    Jacobian,
    ResidualAndJacobian,
    /// Only materials and reducers are evaluated.
    ReductionsOnly,
}

impl Evaluation {
    fn residual(&self) -> bool {
        matches!(self, Evaluation::Residual | Evaluation::ResidualAndJacobian)
    }

    fn jacobian(&self) -> bool {
        matches!(self, Evaluation::Jacobian | Evaluation::ResidualAndJacobian)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Pass {
    InitialStateful,
    Evaluate(Evaluation),
}

/// The result of one element loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSummary<T> {
    pub num_entities: usize,
    /// The combined value of every reducer, `None` if no entity contributed.
    pub reductions: BTreeMap<String, Option<T>>,
}

struct WorkerScratch<T: Real> {
    store: Option<PropertyStore>,
    entity: EntityData<T>,
    assembler: TaggingAssembler<T>,
}

impl<T: Real> Default for WorkerScratch<T> {
    fn default() -> Self {
        Self {
            store: None,
            entity: EntityData::default(),
            assembler: TaggingAssembler::default(),
        }
    }
}

/// The store of a worker, rebuilt if the layout or spatial class changed since the last loop.
fn store_for<'s>(
    slot: &'s mut Option<PropertyStore>,
    layout: &Arc<PropertyLayout>,
    class: SpatialClass,
) -> &'s mut PropertyStore {
    let reusable = slot
        .as_ref()
        .map(|store| store.class() == class && Arc::ptr_eq(store.layout(), layout))
        .unwrap_or(false);
    if !reusable {
        *slot = Some(PropertyStore::new(Arc::clone(layout), class));
    }
    slot.as_mut()
        .expect("Internal error: property store was just created")
}

/// The partial result of one chunk of entities.
struct ChunkResult<T: Real> {
    contributions: TaggedContributions<T>,
    reductions: Vec<Option<T>>,
    records: Vec<(EntityId, StatefulRecord)>,
}

/// Splits a range of entities into contiguous chunks, evaluates them on a dedicated thread pool
/// and joins the per-chunk results sequentially.
///
/// For every entity, a worker
///
/// 1. reinitializes the entity data through the [`EntitySource`],
/// 2. loads the Old and Older values of stateful properties,
/// 3. evaluates the active materials in dependency order,
/// 4. lets every active kernel compute and tag its local contributions and
/// 5. evaluates the active reducers.
///
/// Workers never write to shared state. Contributions, reductions and new stateful values are
/// collected per chunk and merged after all workers finish, in chunk order.
pub struct ElementLoopScheduler<T: Real> {
    pool: ThreadPool,
    settings: SchedulerSettings,
    scratch: ThreadLocal<RefCell<WorkerScratch<T>>>,
}

impl<T: Real> std::fmt::Debug for ElementLoopScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementLoopScheduler")
            .field("settings", &self.settings)
            .field("num_threads", &self.num_threads())
            .finish()
    }
}

impl<T: Real> ElementLoopScheduler<T> {
    pub fn new(settings: SchedulerSettings) -> eyre::Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(settings.num_threads)
            .thread_name(|idx| format!("strata-worker-{idx}"))
            .build()
            .wrap_err("failed to build the element loop thread pool")?;
        log::info!("Element loop scheduler uses {} worker threads", pool.current_num_threads());
        Ok(Self {
            pool,
            settings,
            scratch: ThreadLocal::new(),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Contiguous chunks covering `0 .. num_entities`, one per worker unless the chunks would
    /// fall below the minimum chunk length.
    pub fn chunk_ranges(&self, num_entities: usize) -> Vec<Range<usize>> {
        let num_threads = self.num_threads().max(1);
        let chunk_len = ((num_entities + num_threads - 1) / num_threads)
            .max(self.settings.min_chunk_len)
            .max(1);
        (0..num_entities)
            .step_by(chunk_len)
            .map(|start| start..(start + chunk_len).min(num_entities))
            .collect()
    }

    /// Set the initial values of all stateful properties produced on the entities of `source`.
    ///
    /// Materials initialize their properties with
    /// [`init_qp_stateful_properties`](crate::objects::Material::init_qp_stateful_properties);
    /// the resulting values become the Current, Old and Older history of every entity.
    pub fn initialize_stateful(
        &self,
        source: &dyn EntitySource<T>,
        warehouse: &ObjectWarehouse<T>,
        stateful: &mut StatefulStorage,
    ) -> eyre::Result<LoopSummary<T>> {
        let class = source.spatial_class();
        if !warehouse.layout().has_stateful_properties(class) {
            return Ok(LoopSummary {
                num_entities: source.num_entities(),
                reductions: BTreeMap::new(),
            });
        }
        // No tagged output is produced, so an empty storage suffices.
        let mut storage = TaggedStorage::new(&TagRegistry::new(), 0);
        let (summary, records) = self.run(source, warehouse, stateful, &mut storage, Pass::InitialStateful)?;
        for (entity, record) in records {
            stateful.commit_initial(class, entity, record);
        }
        Ok(summary)
    }

    /// Run one element loop over the entities of `source`.
    ///
    /// Tagged contributions are added to `storage`, the current values of stateful properties
    /// are committed to `stateful`.
    pub fn execute(
        &self,
        source: &dyn EntitySource<T>,
        warehouse: &ObjectWarehouse<T>,
        stateful: &mut StatefulStorage,
        storage: &mut TaggedStorage<T>,
        evaluation: Evaluation,
    ) -> eyre::Result<LoopSummary<T>> {
        let class = source.spatial_class();
        let (summary, records) = self.run(source, warehouse, stateful, storage, Pass::Evaluate(evaluation))?;
        for (entity, record) in records {
            stateful.commit(class, entity, record)?;
        }
        Ok(summary)
    }

    fn run(
        &self,
        source: &dyn EntitySource<T>,
        warehouse: &ObjectWarehouse<T>,
        stateful: &StatefulStorage,
        storage: &mut TaggedStorage<T>,
        pass: Pass,
    ) -> eyre::Result<(LoopSummary<T>, Vec<(EntityId, StatefulRecord)>)> {
        assert!(
            Arc::ptr_eq(warehouse.layout(), stateful.layout()),
            "Internal error: warehouse and stateful storage were built from different layouts"
        );
        let num_entities = source.num_entities();
        let chunks = self.chunk_ranges(num_entities);
        let num_chunks = chunks.len();

        let shared_storage = &*storage;
        let results: Vec<ChunkResult<T>> = self.pool.install(|| {
            chunks
                .into_par_iter()
                .enumerate()
                .map(|(chunk_index, range)| -> eyre::Result<ChunkResult<T>> {
                    log::trace!("Chunk {chunk_index}/{num_chunks}: entities {range:?}");
                    let cell = self.scratch.get_or_default();
                    let scratch = &mut *cell.borrow_mut();
                    let mut result = ChunkResult {
                        contributions: shared_storage.new_contributions(),
                        reductions: vec![None; warehouse.num_reducers()],
                        records: Vec::new(),
                    };
                    for index in range {
                        evaluate_entity(index, source, warehouse, stateful, pass, scratch, &mut result)?;
                    }
                    Ok(result)
                })
                .collect::<eyre::Result<Vec<_>>>()
        })?;

        // Sums first, then assignments, so that assigned values are never added to.
        for result in &results {
            storage.add_contributions(&result.contributions);
        }
        for result in &results {
            storage.apply_assignments(&result.contributions);
        }

        let mut reductions: Vec<Option<T>> = vec![None; warehouse.num_reducers()];
        let mut records = Vec::new();
        for result in results {
            for (reducer, total, partial) in izip!(warehouse.reducers(), &mut reductions, result.reductions) {
                *total = reducer.reduction().combine_partial(*total, partial);
            }
            records.extend(result.records);
        }

        let summary = LoopSummary {
            num_entities,
            reductions: warehouse
                .reducers()
                .iter()
                .zip(reductions)
                .map(|(reducer, value)| (reducer.params().name.clone(), value))
                .collect(),
        };
        Ok((summary, records))
    }
}

fn evaluate_entity<T: Real>(
    index: usize,
    source: &dyn EntitySource<T>,
    warehouse: &ObjectWarehouse<T>,
    stateful: &StatefulStorage,
    pass: Pass,
    scratch: &mut WorkerScratch<T>,
    result: &mut ChunkResult<T>,
) -> eyre::Result<()> {
    let class = source.spatial_class();
    let layout = warehouse.layout();

    source
        .reinit(index, &mut scratch.entity)
        .wrap_err_with(|| format!("failed to reinitialize the entity at index {index}"))?;

    let WorkerScratch {
        store,
        entity,
        assembler,
    } = scratch;
    let store = store_for(store, layout, class);
    let entity_id = entity.id;
    let wrap = || format!("element loop failed on entity {entity_id}");

    if entity.num_qp() > layout.max_qp() {
        return Err(eyre!(
            "entity has {} quadrature points, more than the maximum of {}",
            entity.num_qp(),
            layout.max_qp()
        ))
        .wrap_err_with(wrap);
    }
    store.resize(entity.num_qp());

    let has_history = layout.has_stateful_properties(class);
    if has_history && pass != Pass::InitialStateful {
        stateful.restore(entity_id, store).wrap_err_with(wrap)?;
    }

    let context = EvaluationContext {
        entity: &*entity,
        properties: &*store,
    };

    for material in warehouse.materials(class, entity.subdomain) {
        let name = &material.params().name;
        let outcome = match pass {
            Pass::InitialStateful => (0..context.num_qp())
                .try_for_each(|qp| material.init_qp_stateful_properties(&context, qp)),
            Pass::Evaluate(_) => material.compute_properties(&context),
        };
        outcome
            .wrap_err_with(|| format!("material `{name}` failed"))
            .wrap_err_with(wrap)?;
    }

    if let Pass::Evaluate(evaluation) = pass {
        for (kernel, tags) in warehouse.kernels(class, entity.subdomain) {
            let name = &kernel.params().name;
            {
                let mut local = LocalAssembly::new(assembler, tags, &mut result.contributions, entity_id);
                if evaluation.residual() {
                    kernel
                        .compute_residual(&context, &mut local)
                        .wrap_err_with(|| format!("kernel `{name}` failed to compute its residual"))
                        .wrap_err_with(wrap)?;
                }
                if evaluation.jacobian() {
                    kernel
                        .compute_jacobian(&context, &mut local)
                        .wrap_err_with(|| format!("kernel `{name}` failed to compute its Jacobian"))
                        .wrap_err_with(wrap)?;
                }
            }
            assert!(
                !assembler.has_pending(),
                "Internal error: kernel `{name}` left local contributions unflushed on entity {entity_id}"
            );
            assembler.reset();
        }

        for (reducer, total) in warehouse.reducers().iter().zip(&mut result.reductions) {
            if !reducer.params().blocks.contains(entity.subdomain) || reducer.params().class != class {
                continue;
            }
            let name = &reducer.params().name;
            let value = reducer
                .execute(&context)
                .wrap_err_with(|| format!("reducer `{name}` failed"))
                .wrap_err_with(wrap)?;
            *total = reducer.reduction().combine_partial(*total, value);
        }
    }

    if has_history {
        result.records.push((entity_id, store.current_record()));
    }
    Ok(())
}

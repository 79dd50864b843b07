//! Turn planning: intent to task graph to execution plan.
//!
//! Every turn gets a primary task. A chained `next_action` becomes a
//! dependent task, and a page analysis task is added opportunistically when
//! it can run in parallel with the primary. Grouping requires `can_parallel`
//! on both sides, no transitive dependency between members, and disjoint
//! write sets.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;
use webreader_core_types::TaskId;

use crate::actions::{ActionRegistry, TaskKind};
use crate::errors::{ReaderError, ReaderResult};
use crate::intent::ClassifiedIntent;
use crate::state::NavigationState;

/// One schedulable unit of a turn.
#[derive(Clone, Debug)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub payload: Option<String>,
    pub dependencies: BTreeSet<TaskId>,
    pub can_parallel: bool,
}

/// One step of the linearized plan.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PlanStep {
    Single(TaskId),
    Parallel(Vec<TaskId>),
}

/// The plan for one user turn. Discarded when the turn ends.
#[derive(Clone, Debug)]
pub struct TurnPlan {
    pub tasks: BTreeMap<TaskId, Task>,
    pub steps: Vec<PlanStep>,
}

impl TurnPlan {
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }
}

pub struct TaskPlanner {
    registry: Arc<ActionRegistry>,
}

impl TaskPlanner {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self { registry }
    }

    /// Plan one classified intent against the current session state.
    pub fn plan(
        &self,
        intent: &ClassifiedIntent,
        state: &NavigationState,
    ) -> ReaderResult<TurnPlan> {
        let mut order = Vec::new();
        let mut tasks = BTreeMap::new();

        let primary_id = TaskId::named("primary");
        let primary = self.task(
            primary_id.clone(),
            TaskKind::Act(intent.action),
            intent.context.clone(),
            BTreeSet::new(),
        )?;
        let primary_parallel = primary.can_parallel;
        order.push(primary_id.clone());
        tasks.insert(primary_id.clone(), primary);

        if let Some(next) = intent.next_action {
            let chained_id = TaskId::named("chained");
            let chained = self.task(
                chained_id.clone(),
                TaskKind::Act(next),
                intent.next_context.clone(),
                BTreeSet::from([primary_id.clone()]),
            )?;
            order.push(chained_id.clone());
            tasks.insert(chained_id, chained);
        }

        // Piggyback a context refresh when the primary tolerates company.
        if state.page.is_some()
            && primary_parallel
            && self.writes_disjoint(TaskKind::Act(intent.action), TaskKind::PageAnalysis)?
        {
            let analysis_id = TaskId::named("analysis");
            let analysis = self.task(
                analysis_id.clone(),
                TaskKind::PageAnalysis,
                None,
                BTreeSet::new(),
            )?;
            order.push(analysis_id.clone());
            tasks.insert(analysis_id, analysis);
        }

        self.build(order, tasks)
    }

    /// Plan a single task, used when recovery swaps in an alternative action.
    pub fn plan_single(
        &self,
        kind: TaskKind,
        payload: Option<String>,
    ) -> ReaderResult<TurnPlan> {
        let id = TaskId::named("primary");
        let task = self.task(id.clone(), kind, payload, BTreeSet::new())?;
        let mut tasks = BTreeMap::new();
        tasks.insert(id.clone(), task);
        self.build(vec![id], tasks)
    }

    fn task(
        &self,
        id: TaskId,
        kind: TaskKind,
        payload: Option<String>,
        dependencies: BTreeSet<TaskId>,
    ) -> ReaderResult<Task> {
        let handler = self
            .registry
            .get(kind)
            .ok_or_else(|| ReaderError::Planning(format!("no handler for {kind}")))?;
        Ok(Task {
            id,
            kind,
            payload,
            dependencies,
            can_parallel: handler.can_parallel(),
        })
    }

    fn writes_disjoint(&self, a: TaskKind, b: TaskKind) -> ReaderResult<bool> {
        let a = self
            .registry
            .get(a)
            .ok_or_else(|| ReaderError::Planning(format!("no handler for {a}")))?;
        let b = self
            .registry
            .get(b)
            .ok_or_else(|| ReaderError::Planning(format!("no handler for {b}")))?;
        Ok(!a.writes().iter().any(|f| b.writes().contains(f)))
    }

    fn build(&self, order: Vec<TaskId>, tasks: BTreeMap<TaskId, Task>) -> ReaderResult<TurnPlan> {
        let groups = self.find_parallel_tasks(&order, &tasks)?;
        let steps = linearize(&order, &tasks, &groups)?;
        debug!(tasks = tasks.len(), steps = steps.len(), "turn planned");
        Ok(TurnPlan { tasks, steps })
    }

    /// Greedily group parallel-capable tasks that are mutually independent
    /// and write disjoint state fields.
    fn find_parallel_tasks(
        &self,
        order: &[TaskId],
        tasks: &BTreeMap<TaskId, Task>,
    ) -> ReaderResult<Vec<Vec<TaskId>>> {
        let mut groups: Vec<Vec<TaskId>> = Vec::new();
        let mut assigned: BTreeSet<TaskId> = BTreeSet::new();
        for id in order {
            let task = &tasks[id];
            if !task.can_parallel || assigned.contains(id) {
                continue;
            }
            let mut group = vec![id.clone()];
            for candidate_id in order {
                if candidate_id == id || assigned.contains(candidate_id) {
                    continue;
                }
                let candidate = &tasks[candidate_id];
                if !candidate.can_parallel {
                    continue;
                }
                let mut compatible = true;
                for member_id in &group {
                    let member = &tasks[member_id];
                    if depends_transitively(tasks, candidate_id, member_id)
                        || depends_transitively(tasks, member_id, candidate_id)
                        || !self.writes_disjoint(member.kind, candidate.kind)?
                    {
                        compatible = false;
                        break;
                    }
                }
                if compatible {
                    group.push(candidate_id.clone());
                }
            }
            if group.len() > 1 {
                for member in &group {
                    assigned.insert(member.clone());
                }
                groups.push(group);
            }
        }
        Ok(groups)
    }
}

/// Whether `from` depends on `to` through any dependency path.
fn depends_transitively(tasks: &BTreeMap<TaskId, Task>, from: &TaskId, to: &TaskId) -> bool {
    let mut stack: Vec<&TaskId> = match tasks.get(from) {
        Some(task) => task.dependencies.iter().collect(),
        None => return false,
    };
    let mut seen = BTreeSet::new();
    while let Some(current) = stack.pop() {
        if current == to {
            return true;
        }
        if !seen.insert(current.clone()) {
            continue;
        }
        if let Some(task) = tasks.get(current) {
            stack.extend(task.dependencies.iter());
        }
    }
    false
}

/// Ready-set linearization: repeatedly schedule tasks whose dependencies are
/// satisfied, emitting a parallel step whenever a whole group is ready. A
/// stall with tasks remaining means the graph has a cycle.
fn linearize(
    order: &[TaskId],
    tasks: &BTreeMap<TaskId, Task>,
    groups: &[Vec<TaskId>],
) -> ReaderResult<Vec<PlanStep>> {
    let mut steps = Vec::new();
    let mut scheduled: BTreeSet<TaskId> = BTreeSet::new();
    while scheduled.len() < tasks.len() {
        let ready: Vec<TaskId> = order
            .iter()
            .filter(|id| {
                !scheduled.contains(*id)
                    && tasks[*id].dependencies.iter().all(|d| scheduled.contains(d))
            })
            .cloned()
            .collect();
        if ready.is_empty() {
            return Err(ReaderError::Planning(
                "task graph stalled with tasks remaining (cycle)".into(),
            ));
        }
        let mut emitted = false;
        for group in groups {
            if group.iter().all(|id| ready.contains(id)) {
                for id in group {
                    scheduled.insert(id.clone());
                }
                steps.push(PlanStep::Parallel(group.clone()));
                emitted = true;
            }
        }
        for id in ready {
            if scheduled.contains(&id) {
                continue;
            }
            scheduled.insert(id.clone());
            steps.push(PlanStep::Single(id));
            emitted = true;
        }
        if !emitted {
            return Err(ReaderError::Planning("no progress in plan emission".into()));
        }
    }
    Ok(steps)
}

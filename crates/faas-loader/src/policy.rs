//! Invocation policies decide whether a trace slot is dispatched and which function receives it.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::error;

use crate::config::LoaderConfiguration;
use crate::function::Function;
use crate::util::FxIndexMap;

/// Experiment training modes understood by the loader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainingMode {
    Multi,
    HiveD,
    Infless,
    Elastic,
    Caerus,
    BatchPriority,
    PipelineBatchPriority,
    Knative,
    ElasticFlow,
}

impl FromStr for TrainingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "multi" => Ok(TrainingMode::Multi),
            "hived" => Ok(TrainingMode::HiveD),
            "infless" => Ok(TrainingMode::Infless),
            "elastic" => Ok(TrainingMode::Elastic),
            "caerus" => Ok(TrainingMode::Caerus),
            "batch_priority" => Ok(TrainingMode::BatchPriority),
            "pipeline_batch_priority" => Ok(TrainingMode::PipelineBatchPriority),
            "knative" => Ok(TrainingMode::Knative),
            "elasticflow" => Ok(TrainingMode::ElasticFlow),
            _ => Err(format!("Invalid client_training value: {}", s)),
        }
    }
}

impl fmt::Display for TrainingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrainingMode::Multi => "multi",
            TrainingMode::HiveD => "hived",
            TrainingMode::Infless => "infless",
            TrainingMode::Elastic => "elastic",
            TrainingMode::Caerus => "caerus",
            TrainingMode::BatchPriority => "batch_priority",
            TrainingMode::PipelineBatchPriority => "pipeline_batch_priority",
            TrainingMode::Knative => "knative",
            TrainingMode::ElasticFlow => "elasticflow",
        };
        write!(f, "{}", s)
    }
}

impl TrainingMode {
    pub fn policy_kind(&self) -> PolicyKind {
        match self {
            TrainingMode::Multi | TrainingMode::HiveD | TrainingMode::Infless | TrainingMode::Elastic => {
                PolicyKind::GpuMatching
            }
            TrainingMode::Caerus
            | TrainingMode::BatchPriority
            | TrainingMode::PipelineBatchPriority
            | TrainingMode::Knative => PolicyKind::PassThrough,
            TrainingMode::ElasticFlow => PolicyKind::ReplicaFanOut,
        }
    }

    pub fn grouping(&self, serverful_copy_replicas: usize) -> SiblingGrouping {
        match self {
            TrainingMode::HiveD | TrainingMode::Infless | TrainingMode::Elastic => SiblingGrouping::GpuVariants,
            TrainingMode::ElasticFlow => SiblingGrouping::ServerfulCopies(serverful_copy_replicas),
            _ => SiblingGrouping::All,
        }
    }

    /// Modes whose invocations consult an external admission scheduler first.
    pub fn requires_admission(&self) -> bool {
        matches!(
            self,
            TrainingMode::Elastic | TrainingMode::Infless | TrainingMode::ElasticFlow
        )
    }
}

/// Behavior class of a training mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyKind {
    /// Only the GPU-count variant matching the invocation's batch size fires.
    GpuMatching,
    /// Every slot fires on its own function.
    PassThrough,
    /// Every slot fires, round-robin over serverful copies of the function.
    ReplicaFanOut,
}

/// Identifies the policy class of a mode tag. Unknown tags are reported and treated as pass-through.
pub fn identify(mode: &str) -> PolicyKind {
    match TrainingMode::from_str(mode) {
        Ok(m) => m.policy_kind(),
        Err(e) => {
            error!("{}", e);
            PolicyKind::PassThrough
        }
    }
}

/// How functions are grouped into one driver with its siblings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SiblingGrouping {
    /// Every function gets a driver, all functions are siblings.
    All,
    /// Every function gets a driver, its siblings are the GPU-count variants of the same logical function.
    GpuVariants,
    /// One driver per group of the given number of serverful copies, siblings are the copies.
    ServerfulCopies(usize),
}

/// A driver to start: index of the driven function and the functions grouped with it.
#[derive(Clone)]
pub struct DriverAssignment {
    pub index: usize,
    pub siblings: Arc<[Arc<Function>]>,
}

pub fn assign_drivers(functions: &[Arc<Function>], grouping: SiblingGrouping) -> Vec<DriverAssignment> {
    match grouping {
        SiblingGrouping::All => {
            let all: Arc<[Arc<Function>]> = functions.iter().cloned().collect();
            (0..functions.len())
                .map(|index| DriverAssignment {
                    index,
                    siblings: all.clone(),
                })
                .collect()
        }
        SiblingGrouping::GpuVariants | SiblingGrouping::ServerfulCopies(_) => {
            let mut groups: FxIndexMap<&str, Vec<Arc<Function>>> = Default::default();
            for f in functions.iter() {
                groups.entry(f.logical_name()).or_default().push(f.clone());
            }
            let groups: FxIndexMap<&str, Arc<[Arc<Function>]>> =
                groups.into_iter().map(|(k, v)| (k, Arc::from(v))).collect();
            let mut result = Vec::new();
            for (index, f) in functions.iter().enumerate() {
                if let SiblingGrouping::ServerfulCopies(replicas) = grouping {
                    if index % replicas.max(1) != 0 {
                        continue;
                    }
                }
                result.push(DriverAssignment {
                    index,
                    siblings: groups[f.logical_name()].clone(),
                });
            }
            result
        }
    }
}

/// Outcome of consulting the policy for one slot.
#[derive(Clone, Debug)]
pub enum Dispatch {
    Fire(Arc<Function>),
    Skip,
}

impl Dispatch {
    pub fn fires(&self) -> bool {
        matches!(self, Dispatch::Fire(_))
    }
}

/// State of a driver at the moment a slot is resolved.
pub struct PolicyContext<'a> {
    pub function: &'a Arc<Function>,
    pub siblings: &'a [Arc<Function>],
    /// Number of slots issued so far by the driver, this one included.
    pub issued: u64,
}

/// Strategy selected once per experiment and shared by all drivers.
pub trait InvocationPolicy: Send + Sync {
    fn resolve(&self, ctx: &PolicyContext<'_>) -> Dispatch;

    fn kind(&self) -> PolicyKind;

    fn grouping(&self) -> SiblingGrouping {
        SiblingGrouping::All
    }

    fn get_name(&self) -> String {
        "STUB POLICY NAME".to_string()
    }
}

/// Fires a slot only on the variant whose GPU count equals `batch_size / bsz_per_device`.
pub struct GpuMatchingPolicy {
    bsz_per_device: i64,
    grouping: SiblingGrouping,
}

impl GpuMatchingPolicy {
    pub fn new(bsz_per_device: i64, grouping: SiblingGrouping) -> Self {
        Self {
            bsz_per_device,
            grouping,
        }
    }
}

impl InvocationPolicy for GpuMatchingPolicy {
    fn resolve(&self, ctx: &PolicyContext<'_>) -> Dispatch {
        let batch_size = match ctx.function.batch_stats.get((ctx.issued as usize).saturating_sub(1)) {
            Some(x) => *x,
            None => {
                error!(
                    "Function {} has no batch size for invocation {}",
                    ctx.function.name, ctx.issued
                );
                return Dispatch::Skip;
            }
        };
        let expected_gpu_count = batch_size / self.bsz_per_device;
        if ctx.function.gpu_count() == Some(expected_gpu_count) {
            Dispatch::Fire(ctx.function.clone())
        } else {
            Dispatch::Skip
        }
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::GpuMatching
    }

    fn grouping(&self) -> SiblingGrouping {
        self.grouping
    }

    fn get_name(&self) -> String {
        format!("GpuMatchingPolicy[bsz_per_device={}]", self.bsz_per_device)
    }
}

/// Fires every slot on the driven function.
pub struct PassThroughPolicy {}

impl InvocationPolicy for PassThroughPolicy {
    fn resolve(&self, ctx: &PolicyContext<'_>) -> Dispatch {
        Dispatch::Fire(ctx.function.clone())
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::PassThrough
    }

    fn get_name(&self) -> String {
        "PassThroughPolicy".to_string()
    }
}

/// Fires every slot on sibling number `issued % replicas`.
pub struct ReplicaFanOutPolicy {
    replicas: usize,
}

impl ReplicaFanOutPolicy {
    pub fn new(replicas: usize) -> Self {
        Self { replicas }
    }
}

impl InvocationPolicy for ReplicaFanOutPolicy {
    fn resolve(&self, ctx: &PolicyContext<'_>) -> Dispatch {
        let n = usize::min(self.replicas, ctx.siblings.len());
        if n == 0 {
            return Dispatch::Fire(ctx.function.clone());
        }
        Dispatch::Fire(ctx.siblings[(ctx.issued as usize) % n].clone())
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::ReplicaFanOut
    }

    fn grouping(&self) -> SiblingGrouping {
        SiblingGrouping::ServerfulCopies(self.replicas)
    }

    fn get_name(&self) -> String {
        format!("ReplicaFanOutPolicy[replicas={}]", self.replicas)
    }
}

/// Builds the policy of the configured training mode.
pub fn default_policy_resolver(config: &LoaderConfiguration) -> Box<dyn InvocationPolicy> {
    let mode = match TrainingMode::from_str(&config.client_training) {
        Ok(mode) => mode,
        Err(e) => {
            error!("{}", e);
            return Box::new(PassThroughPolicy {});
        }
    };
    let grouping = mode.grouping(config.serverful_copy_replicas);
    match mode.policy_kind() {
        PolicyKind::GpuMatching => Box::new(GpuMatchingPolicy::new(config.bsz_per_device, grouping)),
        PolicyKind::PassThrough => Box::new(PassThroughPolicy {}),
        PolicyKind::ReplicaFanOut => Box::new(ReplicaFanOutPolicy::new(config.serverful_copy_replicas)),
    }
}

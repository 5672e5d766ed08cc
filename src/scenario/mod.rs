//! Scenario scheduling: small branch programs dispatched onto tagged thread pools.
//!
//! A [`ScenarioManager`] owns one [`ThreadPool`] per configured tag. Each
//! `notify_add_queue_data(name)` queues one execution of scenario `name` on
//! its pool; the lines of one execution run in order on one worker.

mod action;
mod pool;
mod stats;

pub use action::{Action, ContextValue, Outcome};

pub use crate::platform::Priority;
pub use pool::{ThreadPool, MAX_POOL_SIZE};
pub use stats::{ExecutionSample, ExecutionStatistic, StatisticCollector, TimeCounter};

use crate::error::{Error, Result};
use crate::logging::{LogEvent, StructuredLogger};
use crate::object::{
    ClassId, CommandProcessor, FinalConstruct, Object, QueueNotificationAcceptor, Service,
};
use crate::platform::thread_cpu_time;
use crate::variant::{json, Dictionary, Variant};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub const CLSID_SCENARIO_MANAGER: ClassId = 0x4F2C_7A91;

pub const DEFAULT_POOL_TAG: &str = "default";
pub const MAIN_BRANCH: &str = "main";
const DEFAULT_POOL_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PoolConfig {
    size: usize,
    priority: Priority,
}

/// Compiled scenario line
struct Line {
    /// Position in the statistic line table
    index: usize,
    action: Action,
}

/// Named branches of actions run as one unit of work.
///
/// Execution starts at branch `main` with a fresh context dictionary and ends
/// at `$ret`, at the end of the current branch (null result) or at the first
/// uncaught failure.
pub struct Scenario {
    name: String,
    pool_tag: String,
    add_params: bool,
    branches: BTreeMap<String, Vec<Line>>,
    labels: Vec<String>,
}

impl Scenario {
    /// Config: `{"code": [lines] | {branch: [lines]}, "threadPoolTag"?: tag,
    /// "addParams"?: bool}`
    pub fn from_config(name: &str, config: &Variant) -> Result<Self> {
        let dict = config.as_dict().ok_or_else(|| {
            Error::invalid_argument(format!("scenario <{name}> must be a dictionary"))
        })?;
        let code = dict.require("code").map_err(|e| e.context(format!("scenario <{name}>")))?;
        let sources: Vec<(&str, &Variant)> = match code {
            Variant::Sequence(_) => vec![(MAIN_BRANCH, code)],
            Variant::Dictionary(branches) => branches.iter().collect(),
            other => {
                return Err(Error::invalid_argument(format!(
                    "scenario <{name}>: field <code> must be a sequence or a dictionary of branches, got <{}>",
                    other.value_type()
                )))
            }
        };

        let mut branches = BTreeMap::new();
        let mut labels = Vec::new();
        for (branch, lines) in sources {
            let lines = lines.as_seq().ok_or_else(|| {
                Error::invalid_argument(format!("scenario <{name}>: branch <{branch}> must be a sequence"))
            })?;
            let mut compiled = Vec::with_capacity(lines.len());
            for (i, descriptor) in lines.iter().enumerate() {
                let action = Action::compile(descriptor)
                    .map_err(|e| e.context(format!("scenario <{name}> branch <{branch}> line {i}")))?;
                labels.push(format!("{branch}:{i}:{action}"));
                compiled.push(Line {
                    index: labels.len() - 1,
                    action,
                });
            }
            branches.insert(branch.to_string(), compiled);
        }
        if !branches.contains_key(MAIN_BRANCH) {
            return Err(Error::invalid_argument(format!(
                "scenario <{name}> has no <{MAIN_BRANCH}> branch"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            pool_tag: dict.get_or("threadPoolTag", DEFAULT_POOL_TAG).convert(),
            add_params: dict.get_or("addParams", false).convert(),
            branches,
            labels,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool_tag(&self) -> &str {
        &self.pool_tag
    }

    fn line_labels(&self) -> Vec<String> {
        self.labels.clone()
    }

    /// Run once. `params` lands in the context as `params` when `addParams` is set.
    pub fn execute(&self, params: &Variant, collector: &StatisticCollector) -> Result<Variant> {
        let token = collector.begin();
        let started = Instant::now();
        let cpu_started = thread_cpu_time();
        let mut sample = ExecutionSample::default();

        let result = self.interpret(params, &mut sample);

        if let Some(token) = token {
            sample.global_time = started.elapsed();
            sample.thread_time = thread_cpu_time().saturating_sub(cpu_started);
            collector.record(token, &self.name, &sample);
        }
        result
    }

    fn interpret(&self, params: &Variant, sample: &mut ExecutionSample) -> Result<Variant> {
        let mut context = Variant::Dictionary(Dictionary::new());
        if self.add_params {
            context.put("params", params.clone())?;
        }

        let mut branch = MAIN_BRANCH.to_string();
        let mut lines = self.branch(&branch)?;
        let mut position = 0;
        while let Some(line) = lines.get(position) {
            let line_started = Instant::now();
            let line_cpu = thread_cpu_time();
            let outcome = line.action.execute(&mut context);
            sample
                .lines
                .push((line.index, line_started.elapsed(), thread_cpu_time().saturating_sub(line_cpu)));

            let outcome = outcome.map_err(|e| {
                e.context(format!("scenario <{}> branch <{branch}> line {position}", self.name))
            })?;
            match outcome {
                Outcome::Next => position += 1,
                Outcome::Return(value) => return Ok(value),
                Outcome::Jump { branch: target, default } => {
                    let next = match (self.branches.contains_key(&target), default) {
                        (true, _) => target,
                        (false, Some(default)) if self.branches.contains_key(&default) => default,
                        (false, default) => {
                            return Err(Error::invalid_argument(format!(
                                "scenario <{}>: jump to absent branch <{target}> (default <{}>)",
                                self.name,
                                default.unwrap_or_default()
                            )))
                        }
                    };
                    lines = self.branch(&next)?;
                    branch = next;
                    position = 0;
                }
            }
        }
        Ok(Variant::Null)
    }

    fn branch(&self, name: &str) -> Result<&[Line]> {
        self.branches
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::invalid_argument(format!("scenario <{}> has no branch <{name}>", self.name)))
    }
}

#[derive(Default)]
enum ManagerState {
    #[default]
    Created,
    Started(HashMap<String, Arc<ThreadPool>>),
    Stopped,
}

impl ManagerState {
    fn name(&self) -> &'static str {
        match self {
            ManagerState::Created => "created",
            ManagerState::Started(_) => "started",
            ManagerState::Stopped => "stopped",
        }
    }
}

/// Dispatches scenarios onto per-tag thread pools.
///
/// Config: `{"threadPools": {tag: {"size", "priority"}}, "scenarios": {name:
/// {"code", "threadPoolTag"}}, "collectStatistic": bool}`.
pub struct ScenarioManager {
    pool_configs: BTreeMap<String, PoolConfig>,
    scenarios: HashMap<String, Arc<Scenario>>,
    statistics: Arc<StatisticCollector>,
    state: RwLock<ManagerState>,
}

impl Default for ScenarioManager {
    fn default() -> Self {
        Self {
            pool_configs: BTreeMap::new(),
            scenarios: HashMap::new(),
            statistics: Arc::new(StatisticCollector::new(false, Vec::new())),
            state: RwLock::new(ManagerState::Created),
        }
    }
}

impl FinalConstruct for ScenarioManager {
    fn final_construct(&mut self, config: &Variant) -> Result<()> {
        let config = config.as_dict().ok_or_else(|| {
            Error::invalid_argument(format!("configuration must be a dictionary, got <{}>", config.value_type()))
        })?;

        if let Some(pools) = config.get("threadPools") {
            let pools = pools
                .as_dict()
                .ok_or_else(|| Error::invalid_argument("field <threadPools> must be a dictionary"))?;
            for (tag, pool) in pools.iter() {
                self.pool_configs.insert(tag.to_string(), parse_pool_config(tag, pool)?);
            }
        }
        self.pool_configs.entry(DEFAULT_POOL_TAG.to_string()).or_insert(PoolConfig {
            size: DEFAULT_POOL_SIZE,
            priority: Priority::Normal,
        });

        if let Some(scenarios) = config.get("scenarios") {
            let scenarios = scenarios
                .as_dict()
                .ok_or_else(|| Error::invalid_argument("field <scenarios> must be a dictionary"))?;
            for (name, scenario) in scenarios.iter() {
                let scenario = Scenario::from_config(name, scenario)?;
                if !self.pool_configs.contains_key(scenario.pool_tag()) {
                    warn!(scenario = name, tag = scenario.pool_tag(), "unknown thread pool tag, default pool is used");
                }
                self.scenarios.insert(name.to_string(), Arc::new(scenario));
            }
        }

        let collect = config.get_or("collectStatistic", false).convert::<bool>();
        let labels = self
            .scenarios
            .values()
            .map(|s| (s.name().to_string(), s.line_labels()))
            .collect::<Vec<_>>();
        self.statistics = Arc::new(StatisticCollector::new(collect, labels));
        Ok(())
    }
}

fn parse_pool_config(tag: &str, config: &Variant) -> Result<PoolConfig> {
    let size = config.get_or("size", DEFAULT_POOL_SIZE as i64).convert::<i64>();
    if size <= 0 || size > MAX_POOL_SIZE as i64 {
        return Err(Error::invalid_argument(format!(
            "thread pool <{tag}>: size must be in 1..={MAX_POOL_SIZE}, got {size}"
        )));
    }
    let priority_name = config.get_or("priority", "normal").convert::<String>();
    let priority = Priority::parse(&priority_name).ok_or_else(|| {
        Error::invalid_argument(format!("thread pool <{tag}>: unknown priority <{priority_name}>"))
    })?;
    Ok(PoolConfig {
        size: size as usize,
        priority,
    })
}

impl ScenarioManager {
    pub fn from_config(config: &Variant) -> Result<Self> {
        let mut manager = Self::default();
        manager.final_construct(config)?;
        Ok(manager)
    }

    pub fn scenario_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.scenarios.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_started(&self) -> bool {
        matches!(*self.state.read(), ManagerState::Started(_))
    }

    /// Queue one execution of scenario `name`
    pub fn notify(&self, name: &str) {
        let Some(scenario) = self.scenarios.get(name) else {
            warn!(scenario = name, "notification for unknown scenario ignored");
            return;
        };
        let state = self.state.read();
        let ManagerState::Started(pools) = &*state else {
            debug!(scenario = name, state = state.name(), "manager is not started, notification ignored");
            return;
        };
        let Some(pool) = pools.get(scenario.pool_tag()).or_else(|| pools.get(DEFAULT_POOL_TAG)) else {
            error!(scenario = name, "no thread pool available");
            return;
        };

        let scenario = Arc::clone(scenario);
        let statistics = Arc::clone(&self.statistics);
        let job = move || {
            if let Err(e) = scenario.execute(&Variant::Null, &statistics) {
                error!(scenario = %scenario.name(), code = e.code(), error = %e, "scenario failed");
            }
        };
        if let Err(e) = pool.run(job) {
            warn!(scenario = name, error = %e, "can't queue scenario");
        }
    }

    /// Block until every pool is idle
    pub fn wait_idle(&self) {
        let pools: Vec<Arc<ThreadPool>> = match &*self.state.read() {
            ManagerState::Started(pools) => pools.values().cloned().collect(),
            _ => return,
        };
        for pool in pools {
            pool.drain();
        }
    }

    /// Run scenario `name` on the calling thread and return its result
    pub fn run(&self, name: &str, params: &Variant) -> Result<Variant> {
        let scenario = self
            .scenarios
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("scenario <{name}> not found")))?;
        scenario.execute(params, &self.statistics)
    }

    pub fn enable_statistic(&self, enabled: bool) {
        self.statistics.set_enabled(enabled);
        info!(enabled, "scenario statistic collection switched");
    }

    pub fn get_statistic(&self, show_line_info: bool) -> Variant {
        self.statistics.report(show_line_info)
    }

    /// Write the statistic report as one JSON line to stdout
    pub fn dump_statistic(&self) -> Result<()> {
        let report = json::to_json_value(&self.get_statistic(true))?;
        let ts = chrono::Utc::now().to_rfc3339();
        let event = LogEvent {
            ts: &ts,
            level: "INFO",
            target: module_path!(),
            message: "scenario statistic",
            scenario: None,
            command: Some("dumpStatistic"),
            error_code: None,
            data: Some(&report),
        };
        StructuredLogger::emit_json(&event, &mut std::io::stdout().lock());
        Ok(())
    }
}

impl Service for ScenarioManager {
    fn start(&self) -> Result<()> {
        let mut state = self.state.write();
        match &*state {
            ManagerState::Started(_) => return Ok(()),
            ManagerState::Stopped => return Err(Error::invalid_usage("scenario manager is stopped")),
            ManagerState::Created => {}
        }
        let mut pools = HashMap::with_capacity(self.pool_configs.len());
        for (tag, cfg) in &self.pool_configs {
            let pool = ThreadPool::new(&format!("scenario-{tag}"), cfg.size, cfg.priority)?;
            pools.insert(tag.clone(), Arc::new(pool));
        }
        *state = ManagerState::Started(pools);
        info!(pools = self.pool_configs.len(), scenarios = self.scenarios.len(), "scenario manager started");
        Ok(())
    }

    /// Drain queued work, join workers and enter the terminal state
    fn stop(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.state.write(), ManagerState::Stopped);
        if let ManagerState::Started(pools) = previous {
            for pool in pools.values() {
                pool.stop(true);
            }
            info!("scenario manager stopped");
        }
        Ok(())
    }
}

impl QueueNotificationAcceptor for ScenarioManager {
    fn notify_add_queue_data(&self, tag: &Variant) {
        self.notify(&tag.convert::<String>());
    }

    fn notify_queue_overflow_warning(&self, tag: &Variant) {
        warn!(scenario = %tag, "queue overflow reported");
    }
}

impl CommandProcessor for ScenarioManager {
    fn execute(&self, command: &Variant, params: &Variant) -> Result<Variant> {
        match command.convert::<String>().as_str() {
            "start" => self.start().map(|_| Variant::Null),
            "stop" => self.stop().map(|_| Variant::Null),
            "getStatistic" => Ok(self.get_statistic(params.get_or("showLineInfo", false).convert())),
            "dumpStatistic" => self.dump_statistic().map(|_| Variant::Null),
            "execute" => {
                let name = params
                    .get("scenario")
                    .and_then(Variant::as_str)
                    .ok_or_else(|| Error::invalid_argument("missing field <scenario>"))?;
                self.run(name, &params.get_or("params", Variant::Null))
            }
            "enableStatistic" => {
                self.enable_statistic(params.get_or("value", true).convert());
                Ok(Variant::Null)
            }
            other => Err(Error::not_supported(format!("ScenarioManager doesn't support command <{other}>"))),
        }
    }
}

impl Object for ScenarioManager {
    fn class_id(&self) -> ClassId {
        CLSID_SCENARIO_MANAGER
    }

    fn command_processor(self: Arc<Self>) -> Option<Arc<dyn CommandProcessor>> {
        Some(self)
    }

    fn service(self: Arc<Self>) -> Option<Arc<dyn Service>> {
        Some(self)
    }

    fn queue_notification_acceptor(self: Arc<Self>) -> Option<Arc<dyn QueueNotificationAcceptor>> {
        Some(self)
    }
}

impl Drop for ScenarioManager {
    fn drop(&mut self) {
        let _ = Service::stop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{create_object, put_catalog_data, ObjPtr};
    use crate::{dict, seq};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// `add {value}` adds to a shared counter; `fail` always errors
    struct Accumulator {
        total: AtomicI64,
    }

    impl Object for Accumulator {
        fn class_id(&self) -> ClassId {
            0x0D0E_0001
        }

        fn command_processor(self: Arc<Self>) -> Option<Arc<dyn CommandProcessor>> {
            Some(self)
        }
    }

    impl CommandProcessor for Accumulator {
        fn execute(&self, command: &Variant, params: &Variant) -> Result<Variant> {
            match command.as_str() {
                Some("add") => {
                    let value = params.get_or("value", 1).convert::<i64>();
                    Ok(self.total.fetch_add(value, Ordering::SeqCst).into())
                }
                _ => Err(Error::runtime("unsupported")),
            }
        }
    }

    fn accumulator(name: &str) -> Arc<Accumulator> {
        let acc = Arc::new(Accumulator {
            total: AtomicI64::new(0),
        });
        let obj: ObjPtr = acc.clone();
        put_catalog_data(name, obj);
        acc
    }

    fn add(processor: &str, value: i64) -> Variant {
        dict! { "processor" => processor, "command" => "add", "params" => dict! { "value" => value } }
    }

    fn four_scenarios(processor: &str, collect: bool) -> Variant {
        dict! {
            "threadPools" => dict! {
                "fast" => dict! { "size" => 2, "priority" => "high" },
                "slow" => dict! { "size" => 1, "priority" => "low" },
            },
            "scenarios" => dict! {
                "s1" => dict! { "code" => seq![add(processor, 1)], "threadPoolTag" => "fast" },
                "s2" => dict! { "code" => seq![add(processor, 10)], "threadPoolTag" => "slow" },
                "s3" => dict! { "code" => seq![add(processor, 100)] },
                "s4" => dict! { "code" => seq![add(processor, 1000)], "threadPoolTag" => "missing" },
            },
            "collectStatistic" => collect,
        }
    }

    #[test]
    fn test_fan_out_counts_every_notification() {
        let acc = accumulator("test.scenario.fanout");
        let manager = ScenarioManager::from_config(&four_scenarios("test.scenario.fanout", false)).unwrap();
        manager.start().unwrap();
        for _ in 0..5 {
            for name in ["s1", "s2", "s3", "s4"] {
                manager.notify_add_queue_data(&name.into());
            }
        }
        manager.wait_idle();
        assert_eq!(acc.total.load(Ordering::SeqCst), 5555);
        manager.stop().unwrap();
    }

    #[test]
    fn test_statistic_toggling() {
        accumulator("test.scenario.stats");
        let manager = ScenarioManager::from_config(&four_scenarios("test.scenario.stats", true)).unwrap();
        manager.start().unwrap();

        let notify_pattern = |manager: &ScenarioManager| {
            for (name, times) in [("s1", 1), ("s2", 5), ("s3", 10), ("s4", 20)] {
                for _ in 0..times {
                    manager.notify(name);
                }
            }
            manager.wait_idle();
        };

        notify_pattern(&manager);
        manager.execute(&"enableStatistic".into(), &dict! { "value" => false }).unwrap();
        assert!(manager.execute(&"getStatistic".into(), &Variant::Null).unwrap().is_empty());

        manager.execute(&"enableStatistic".into(), &dict! { "value" => true }).unwrap();
        notify_pattern(&manager);
        let stat = manager.execute(&"getStatistic".into(), &Variant::Null).unwrap();
        let total = stat.get("total").unwrap();
        assert_eq!(total.len(), 4);
        for (name, expected) in [("s1", 1), ("s2", 5), ("s3", 10), ("s4", 20)] {
            assert_eq!(total.get(name).unwrap().get_or("count", 0), expected, "{name}");
        }
        assert!(!stat.has("full"));

        let full = manager.get_statistic(true);
        assert!(full.get("full").and_then(|f| f.get("s4")).is_some());
        manager.stop().unwrap();
    }

    #[test]
    fn test_lifecycle() {
        let acc = accumulator("test.scenario.lifecycle");
        let manager = ScenarioManager::from_config(&four_scenarios("test.scenario.lifecycle", false)).unwrap();

        manager.notify("s1");
        manager.start().unwrap();
        manager.start().unwrap();
        manager.notify("unknown");
        manager.notify("s1");
        manager.stop().unwrap();
        assert_eq!(acc.total.load(Ordering::SeqCst), 1);

        manager.notify("s1");
        assert_eq!(acc.total.load(Ordering::SeqCst), 1);
        assert!(matches!(manager.start(), Err(Error::InvalidUsage(_))));
    }

    #[test]
    fn test_failing_command_aborts_only_its_run() {
        let acc = accumulator("test.scenario.failing");
        let config = dict! {
            "scenarios" => dict! {
                "broken" => dict! { "code" => seq![
                    add("test.scenario.failing", 1),
                    dict! { "processor" => "test.scenario.failing", "command" => "explode" },
                    add("test.scenario.failing", 100),
                ] },
            },
        };
        let manager = ScenarioManager::from_config(&config).unwrap();
        manager.start().unwrap();
        manager.notify("broken");
        manager.notify("broken");
        manager.wait_idle();
        assert_eq!(acc.total.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_configuration_errors() {
        accumulator("test.scenario.config");
        let bad_configs = [
            Variant::from(1),
            dict! { "threadPools" => dict! { "p" => dict! { "size" => 0 } } },
            dict! { "threadPools" => dict! { "p" => dict! { "size" => 1_000_000_000 } } },
            dict! { "threadPools" => dict! { "p" => dict! { "priority" => "turbo" } } },
            dict! { "scenarios" => dict! { "s" => dict! {} } },
            dict! { "scenarios" => dict! { "s" => dict! { "code" => seq![dict! { "command" => "add" }] } } },
            dict! { "scenarios" => dict! { "s" => dict! { "code" => dict! { "other" => seq![] } } } },
            dict! { "scenarios" => dict! { "s" => dict! { "code" => dict! { "main" => 1 } } } },
            dict! { "scenarios" => dict! { "s" => dict! { "code" => "main" } } },
        ];
        for config in bad_configs {
            let err = create_object(CLSID_SCENARIO_MANAGER, &config).err().unwrap();
            assert!(matches!(err, Error::InvalidArgument(_)), "{config}: {err}");
        }
    }

    #[test]
    fn test_branches_and_context() {
        let acc = accumulator("test.scenario.branches");
        let config = dict! {
            "scenarios" => dict! {
                "route" => dict! {
                    "addParams" => true,
                    "code" => dict! {
                        "main" => seq![
                            dict! { "$set" => dict! { "$path" => "params.kind" }, "$dst" => "kind" },
                            dict! { "$goto" => dict! { "$path" => "kind" }, "$default" => "other" },
                        ],
                        "file" => seq![
                            add("test.scenario.branches", 1),
                            dict! { "$ret" => "file handled" },
                            add("test.scenario.branches", 1000),
                        ],
                        "other" => seq![
                            dict! {
                                "processor" => "test.scenario.branches",
                                "command" => "explode",
                                "$catch" => dict! { "dst" => "failure", "goto" => "report" },
                            },
                        ],
                        "report" => seq![dict! { "$ret" => dict! { "$path" => "failure.code" } }],
                    },
                },
            },
        };
        let manager = ScenarioManager::from_config(&config).unwrap();
        let run = |kind: &str| {
            manager.execute(
                &"execute".into(),
                &dict! { "scenario" => "route", "params" => dict! { "kind" => kind } },
            )
        };

        assert_eq!(run("file").unwrap(), "file handled");
        assert_eq!(acc.total.load(Ordering::SeqCst), 1);
        assert_eq!(run("registry").unwrap(), Error::runtime("").code() as i64);
        assert!(matches!(manager.run("absent", &Variant::Null), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_conditional_line_and_null_result() {
        let acc = accumulator("test.scenario.condition");
        let config = dict! {
            "scenarios" => dict! {
                "s" => dict! { "code" => seq![
                    dict! { "$set" => false, "$dst" => "enabled" },
                    dict! {
                        "processor" => "test.scenario.condition",
                        "command" => "add",
                        "$if" => dict! { "$path" => "enabled" },
                    },
                    dict! { "processor" => "test.scenario.condition", "command" => "add", "$dst" => "previous" },
                ] },
            },
        };
        let manager = ScenarioManager::from_config(&config).unwrap();
        assert_eq!(manager.run("s", &Variant::Null).unwrap(), Variant::Null);
        assert_eq!(acc.total.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_jump_to_absent_branch_fails() {
        let config = dict! {
            "scenarios" => dict! { "s" => dict! { "code" => seq![dict! { "$goto" => "nowhere" }] } },
        };
        let manager = ScenarioManager::from_config(&config).unwrap();
        assert!(matches!(manager.run("s", &Variant::Null), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_unknown_command() {
        let manager = ScenarioManager::from_config(&dict! {}).unwrap();
        let err = manager.execute(&"reboot".into(), &Variant::Null).unwrap_err();
        assert!(matches!(err, Error::OperationNotSupported(_)));
        assert_eq!(manager.scenario_names(), Vec::<&str>::new());
    }
}

use super::{
    Block, BlockAutopromote, BlockParams, Consequence, Degroup, Disallow, RangeBlock, Tag,
    Throttle, Warn,
};
use crate::config::Config;
use crate::deferred::DeferredUpdates;
use crate::error::{AbuseFilterError, Result};
use crate::filter::{Filter, FilterKey};
use crate::filter_user::FilterUser;
use crate::parameters::{HitContext, Parameters};
use crate::stores::Services;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Builds a consequence from its parameters and raw declared arguments
pub type Constructor = fn(&ConsequencesFactory, Parameters, &[String]) -> Result<Consequence>;

/// Turns `(filter key, consequence name, raw params)` into a consequence
/// bound to one filtered action.
///
/// Constructors live in a table keyed by consequence name, so a new kind is
/// added with [`ConsequencesFactory::register`] rather than by editing a match.
pub struct ConsequencesFactory {
    config: Arc<Config>,
    services: Services,
    filter_user: Arc<FilterUser>,
    context: HitContext,
    filters: BTreeMap<FilterKey, Filter>,
    deferred: Arc<DeferredUpdates>,
    constructors: HashMap<&'static str, Constructor>,
}

impl ConsequencesFactory {
    pub fn new(
        config: Arc<Config>,
        services: Services,
        filter_user: Arc<FilterUser>,
        context: HitContext,
        filters: Vec<Filter>,
        deferred: Arc<DeferredUpdates>,
    ) -> Self {
        let mut factory = Self {
            config,
            services,
            filter_user,
            context,
            filters: filters.into_iter().map(|f| (f.key, f)).collect(),
            deferred,
            constructors: HashMap::new(),
        };
        factory.register("warn", build_warn);
        factory.register("disallow", build_disallow);
        factory.register("block", build_block);
        factory.register("rangeblock", build_range_block);
        factory.register("degroup", build_degroup);
        factory.register("tag", build_tag);
        factory.register("throttle", build_throttle);
        factory.register("blockautopromote", build_block_autopromote);
        factory
    }

    /// Register or replace the constructor for `name`
    pub fn register(&mut self, name: &'static str, constructor: Constructor) {
        self.constructors.insert(name, constructor);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn filter(&self, key: &FilterKey) -> Option<&Filter> {
        self.filters.get(key)
    }

    pub fn context(&self) -> &HitContext {
        &self.context
    }

    pub fn deferred(&self) -> Arc<DeferredUpdates> {
        self.deferred.clone()
    }

    pub fn new_parameters(&self, key: &FilterKey) -> Result<Parameters> {
        let filter = self
            .filter(key)
            .ok_or_else(|| AbuseFilterError::FilterNotFound {
                key: key.to_string(),
            })?;
        Ok(Parameters::new(
            filter.clone(),
            key.global,
            self.context.user.clone(),
            self.context.target.clone(),
            self.context.action,
        ))
    }

    pub fn new_consequence(
        &self,
        key: &FilterKey,
        name: &str,
        raw: &[String],
    ) -> Result<Consequence> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| AbuseFilterError::UnknownConsequence(name.to_string()))?;
        let params = self.new_parameters(key)?;
        constructor(self, params, raw)
    }

    /// Typed block constructor used while reconciling blocks across filters
    pub fn new_block(&self, key: &FilterKey, raw: &[String]) -> Result<Block> {
        let params = self.new_parameters(key)?;
        Ok(Block::new(
            params,
            BlockParams::parse(raw, &self.config.block),
            self.services.blocks.clone(),
            self.filter_user.clone(),
        ))
    }

    /// Typed throttle constructor used while resolving self-exclusive actions
    pub fn new_throttle(&self, key: &FilterKey, raw: &[String]) -> Result<Throttle> {
        let params = self.new_parameters(key)?;
        Throttle::new(
            params,
            raw,
            self.context.clone(),
            &self.config.throttle,
            self.services.throttle.clone(),
            self.deferred.clone(),
        )
    }
}

impl std::fmt::Debug for ConsequencesFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("ConsequencesFactory")
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("constructors", &names)
            .finish()
    }
}

fn build_warn(_: &ConsequencesFactory, params: Parameters, raw: &[String]) -> Result<Consequence> {
    Ok(Consequence::Warn(Warn::new(params, raw)))
}

fn build_disallow(
    _: &ConsequencesFactory,
    params: Parameters,
    raw: &[String],
) -> Result<Consequence> {
    Ok(Consequence::Disallow(Disallow::new(params, raw)))
}

fn build_block(f: &ConsequencesFactory, params: Parameters, raw: &[String]) -> Result<Consequence> {
    Ok(Consequence::Block(Block::new(
        params,
        BlockParams::parse(raw, &f.config.block),
        f.services.blocks.clone(),
        f.filter_user.clone(),
    )))
}

fn build_range_block(
    f: &ConsequencesFactory,
    params: Parameters,
    _: &[String],
) -> Result<Consequence> {
    Ok(Consequence::RangeBlock(RangeBlock::new(
        params,
        f.context.request_ip,
        &f.config.range_block,
        f.services.blocks.clone(),
        f.filter_user.clone(),
    )))
}

fn build_degroup(f: &ConsequencesFactory, params: Parameters, _: &[String]) -> Result<Consequence> {
    Ok(Consequence::Degroup(Degroup::new(
        params,
        f.context.vars.clone(),
        f.config.groups.implicit.clone(),
        f.services.groups.clone(),
        f.filter_user.clone(),
    )))
}

fn build_tag(f: &ConsequencesFactory, params: Parameters, raw: &[String]) -> Result<Consequence> {
    let tags = raw
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    Ok(Consequence::Tag(Tag::new(
        params,
        f.context.action_specifier(),
        tags,
        f.services.tags.clone(),
    )))
}

fn build_throttle(
    f: &ConsequencesFactory,
    params: Parameters,
    raw: &[String],
) -> Result<Consequence> {
    Throttle::new(
        params,
        raw,
        f.context.clone(),
        &f.config.throttle,
        f.services.throttle.clone(),
        f.deferred.clone(),
    )
    .map(Consequence::Throttle)
}

fn build_block_autopromote(
    f: &ConsequencesFactory,
    params: Parameters,
    raw: &[String],
) -> Result<Consequence> {
    Ok(Consequence::BlockAutopromote(BlockAutopromote::new(
        params,
        raw,
        f.config.autopromote.block_days,
        f.services.autopromote.clone(),
        f.filter_user.clone(),
    )))
}

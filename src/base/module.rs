use std::sync::Arc;

use serde::Serialize;

use crate::base::behavior::*;
use crate::sim::clock::Cycle;

#[derive(Debug)]
pub struct ModuleBase<T, C> {
    pub name: String,
    pub cycle: Cycle,
    pub state: T,
    pub config: Arc<C>,
}

impl<T, C> ModuleBase<T, C> {
    pub fn new(name: impl Into<String>, config: Arc<C>, state: T) -> Self {
        Self {
            name: name.into(),
            cycle: 0,
            state,
            config,
        }
    }
}

/// Structured description of a configured instance, used where a wrapper would have logged its
/// parameters.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub name: String,
    pub kind: &'static str,
    pub config: serde_json::Value,
}

pub trait IsModule: ModuleBehaviors {
    type StateType;
    type ConfigType: Serialize;

    fn base(&mut self) -> &mut ModuleBase<Self::StateType, Self::ConfigType>;

    fn base_ref(&self) -> &ModuleBase<Self::StateType, Self::ConfigType>;

    fn kind(&self) -> &'static str;

    fn state_mut(&mut self) -> &mut Self::StateType {
        &mut self.base().state
    }

    fn state(&self) -> &Self::StateType {
        &self.base_ref().state
    }

    fn name(&self) -> &str {
        &self.base_ref().name
    }

    fn cycle(&self) -> Cycle {
        self.base_ref().cycle
    }

    fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            name: self.name().to_string(),
            kind: self.kind(),
            config: serde_json::to_value(self.base_ref().config.as_ref()).unwrap_or_default(),
        }
    }
}

impl<X> Parameterizable for X where X: IsModule {
    type ConfigType = X::ConfigType;

    fn conf(&self) -> &Self::ConfigType {
        self.base_ref().config.as_ref()
    }
}

/// arguments: identifier, state type, config type, kind string, additional methods
macro_rules! module {
    ($comp:ident, $T:ty, $C:ty, $kind:literal, $($method:item)*) => {
        impl IsModule for $comp {
            type StateType = $T;
            type ConfigType = $C;

            fn base(&mut self) -> &mut ModuleBase<$T, $C> {
                &mut self.base
            }

            fn base_ref(&self) -> &ModuleBase<$T, $C> {
                &self.base
            }

            fn kind(&self) -> &'static str {
                $kind
            }

            $($method)*
        }
    };
}

pub(crate) use module;

//! Construction plans
//!
//! A [`Plan`] is the intermediate representation between "what to build"
//! and an invocable factory: a tree of construction nodes. It has two
//! interpretations. [`Plan::evaluate`] walks the tree directly and is used
//! by `activate` and `build_up`; [`crate::factory::compile`] turns it into a
//! closure tree that resolution caches per scope.

use crate::factory::{Compiled, Deferred, FactoryFn};
use crate::introspect::{Activator, MemberSetter, MethodInvoker};
use crate::lifetime::{self, Lifetime};
use crate::registration::{FactoryDelegate, Initializer, RegistrationId};
use crate::scope::ResolutionScope;
use crate::{DiError, Disposer, Instance, Result, ServiceTuple, ServiceType, instance};
use std::fmt;
use std::sync::Arc;

/// Key of one instance slot in a scope's storage.
///
/// Open generic registrations produce one slot per closed implementation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct SlotKey {
    pub registration: RegistrationId,
    pub implementation: ServiceType,
}

/// Execution frame: the scope being resolved from and the arguments of
/// every enclosing parameterized factory, outermost first.
pub(crate) struct Frame<'a> {
    pub scope: &'a ResolutionScope,
    pub arguments: &'a [Arc<[Instance]>],
}

impl<'a> Frame<'a> {
    pub fn new(scope: &'a ResolutionScope) -> Self {
        Self { scope, arguments: &[] }
    }

    fn argument(&self, service_type: &ServiceType, depth: usize, index: usize) -> Result<Instance> {
        self.arguments
            .get(depth)
            .and_then(|args| args.get(index))
            .cloned()
            .ok_or_else(|| DiError::creation_failed(service_type, "factory argument is not bound"))
    }
}

/// Post-construction injection steps.
#[derive(Clone, Default)]
pub(crate) struct Wiring {
    pub members: Vec<(MemberSetter, Plan)>,
    pub methods: Vec<(MethodInvoker, Vec<Plan>)>,
}

impl Wiring {
    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && self.methods.is_empty()
    }
}

#[derive(Clone)]
pub(crate) struct Construct {
    pub implementation: ServiceType,
    pub activator: Activator,
    pub arguments: Vec<Plan>,
    pub wiring: Wiring,
}

pub(crate) enum PlanNode {
    /// A fixed instance: registered instance, override, default value
    Constant(Instance),
    /// Argument `index` of the parameterized factory at `depth`
    Argument {
        service_type: ServiceType,
        depth: usize,
        index: usize,
    },
    /// New instance through a constructor, then member and method injection
    Construct(Construct),
    /// User factory delegate
    Factory {
        service_type: ServiceType,
        delegate: FactoryDelegate,
    },
    /// Member and method injection on an existing instance
    BuildUp { target: Plan, wiring: Wiring },
    /// Registration initializer after construction
    Initialize { inner: Plan, initializer: Initializer },
    /// Transient product added to the resolving scope's disposal list
    Tracked { inner: Plan, disposer: Disposer },
    /// Scoped cache lookup; builds into the lifetime's target scope once
    Cached {
        key: SlotKey,
        lifetime: Lifetime,
        inner: Plan,
        disposer: Option<Disposer>,
    },
    /// One element per plan, in order
    Collection(Vec<Plan>),
    /// One slot per plan
    Tuple(Vec<Plan>),
    /// Built on first access
    Deferred(Plan),
    /// Callable taking `arity` arguments visible to `body`
    Func {
        service_type: ServiceType,
        arity: usize,
        body: Plan,
    },
}

/// An immutable, shareable construction plan.
#[derive(Clone)]
pub struct Plan(Arc<PlanNode>);

impl Plan {
    fn from_node(node: PlanNode) -> Self {
        Self(Arc::new(node))
    }

    /// Always produces `value`.
    pub fn constant(value: Instance) -> Self {
        Self::from_node(PlanNode::Constant(value))
    }

    /// Produces whatever `delegate` returns for the resolving scope.
    pub fn from_factory(service_type: ServiceType, delegate: FactoryDelegate) -> Self {
        Self::from_node(PlanNode::Factory { service_type, delegate })
    }

    /// A `Vec<Instance>` with one element per plan.
    pub fn collection(items: Vec<Plan>) -> Self {
        Self::from_node(PlanNode::Collection(items))
    }

    /// A [`Deferred`] over `inner`.
    pub fn deferred(inner: Plan) -> Self {
        Self::from_node(PlanNode::Deferred(inner))
    }

    pub(crate) fn argument(service_type: ServiceType, depth: usize, index: usize) -> Self {
        Self::from_node(PlanNode::Argument {
            service_type,
            depth,
            index,
        })
    }

    pub(crate) fn construct(construct: Construct) -> Self {
        Self::from_node(PlanNode::Construct(construct))
    }

    pub(crate) fn build_up(target: Plan, wiring: Wiring) -> Self {
        Self::from_node(PlanNode::BuildUp { target, wiring })
    }

    pub(crate) fn initialize(inner: Plan, initializer: Initializer) -> Self {
        Self::from_node(PlanNode::Initialize { inner, initializer })
    }

    pub(crate) fn tracked(inner: Plan, disposer: Disposer) -> Self {
        Self::from_node(PlanNode::Tracked { inner, disposer })
    }

    pub(crate) fn cached(key: SlotKey, lifetime: Lifetime, inner: Plan, disposer: Option<Disposer>) -> Self {
        Self::from_node(PlanNode::Cached {
            key,
            lifetime,
            inner,
            disposer,
        })
    }

    pub(crate) fn tuple(items: Vec<Plan>) -> Self {
        Self::from_node(PlanNode::Tuple(items))
    }

    pub(crate) fn func(service_type: ServiceType, arity: usize, body: Plan) -> Self {
        Self::from_node(PlanNode::Func {
            service_type,
            arity,
            body,
        })
    }

    #[inline]
    pub(crate) fn node(&self) -> &PlanNode {
        &self.0
    }

    /// Interpret the plan directly.
    pub(crate) fn evaluate(&self, frame: &Frame<'_>) -> Result<Instance> {
        match self.node() {
            PlanNode::Constant(value) => Ok(Arc::clone(value)),
            PlanNode::Argument {
                service_type,
                depth,
                index,
            } => frame.argument(service_type, *depth, *index),
            PlanNode::Construct(construct) => {
                let arguments = evaluate_all(&construct.arguments, frame)?;
                let instance = (construct.activator)(&construct.implementation, arguments)?;
                wire(&instance, &construct.wiring, frame)?;
                Ok(instance)
            }
            PlanNode::Factory { delegate, .. } => delegate(frame.scope),
            PlanNode::BuildUp { target, wiring } => {
                let instance = target.evaluate(frame)?;
                wire(&instance, wiring, frame)?;
                Ok(instance)
            }
            PlanNode::Initialize { inner, initializer } => {
                let instance = inner.evaluate(frame)?;
                initializer(&instance, frame.scope)?;
                Ok(instance)
            }
            PlanNode::Tracked { inner, disposer } => {
                let instance = inner.evaluate(frame)?;
                frame.scope.track(&instance, disposer);
                Ok(instance)
            }
            PlanNode::Cached {
                key,
                lifetime,
                inner,
                disposer,
            } => lifetime::resolve_cached(frame, key, lifetime, disposer.as_ref(), |owned| inner.evaluate(owned)),
            PlanNode::Collection(items) => Ok(instance(evaluate_all(items, frame)?)),
            PlanNode::Tuple(items) => Ok(instance(ServiceTuple(evaluate_all(items, frame)?))),
            PlanNode::Deferred(body) => Ok(instance(Deferred::new(frame, interpreted(body)))),
            PlanNode::Func {
                service_type,
                arity,
                body,
            } => Ok(instance(FactoryFn::new(
                frame,
                service_type.clone(),
                *arity,
                interpreted(body),
            ))),
        }
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            PlanNode::Constant(_) => f.write_str("Constant"),
            PlanNode::Argument { depth, index, .. } => write!(f, "Argument({depth}, {index})"),
            PlanNode::Construct(c) => f
                .debug_struct("Construct")
                .field("implementation", &c.implementation)
                .field("arguments", &c.arguments)
                .finish(),
            PlanNode::Factory { service_type, .. } => write!(f, "Factory({service_type})"),
            PlanNode::BuildUp { target, .. } => f.debug_tuple("BuildUp").field(target).finish(),
            PlanNode::Initialize { inner, .. } => f.debug_tuple("Initialize").field(inner).finish(),
            PlanNode::Tracked { inner, .. } => f.debug_tuple("Tracked").field(inner).finish(),
            PlanNode::Cached { lifetime, inner, .. } => {
                f.debug_struct("Cached").field("lifetime", lifetime).field("inner", inner).finish()
            }
            PlanNode::Collection(items) => f.debug_tuple("Collection").field(items).finish(),
            PlanNode::Tuple(items) => f.debug_tuple("Tuple").field(items).finish(),
            PlanNode::Deferred(body) => f.debug_tuple("Deferred").field(body).finish(),
            PlanNode::Func { arity, body, .. } => f.debug_struct("Func").field("arity", arity).field("body", body).finish(),
        }
    }
}

fn evaluate_all(plans: &[Plan], frame: &Frame<'_>) -> Result<Vec<Instance>> {
    plans.iter().map(|plan| plan.evaluate(frame)).collect()
}

fn wire(instance: &Instance, wiring: &Wiring, frame: &Frame<'_>) -> Result<()> {
    for (setter, plan) in &wiring.members {
        setter(instance, plan.evaluate(frame)?)?;
    }
    for (invoker, parameters) in &wiring.methods {
        invoker(instance, evaluate_all(parameters, frame)?)?;
    }
    Ok(())
}

/// Interpreting closure over `plan`, for runtime values built by the evaluator.
fn interpreted(plan: &Plan) -> Compiled {
    let plan = plan.clone();
    Arc::new(move |frame: &Frame<'_>| -> Result<Instance> { plan.evaluate(frame) })
}

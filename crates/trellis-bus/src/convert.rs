//! Runtime-typed value conversion.
//!
//! A [`ConversionTable`] maps `(output type, input type)` pairs to
//! registered [`ConversionRule`]s. Registration hands back the sole
//! strong reference to the rule; the table holds it weakly, so a rule
//! disappears the moment its registrant releases the handle, the same
//! cooperative lifetime model the resource trie uses for receivers.
//!
//! The process-wide table behind [`conversion_rules`] serves the
//! common case; independent tables can be constructed freely.
//!
//! # Example
//!
//! ```
//! use trellis_bus::convert::ConversionTable;
//!
//! let table = ConversionTable::new();
//! let rule = table.define(|x: &i32| x.to_string());
//!
//! assert_eq!(table.convert::<String>(&5).as_deref(), Ok("5"));
//! assert_eq!(table.try_convert::<i32>(&5_u8, -1), -1); // no such rule
//!
//! drop(rule);
//! assert!(table.convert::<String>(&5).is_err());
//! ```

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use trellis_coop::WeakTable;
use trellis_types::ErrorCode;

/// No rule is registered for the requested type pair.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no conversion rule producing `{to}` from the supplied value")]
pub struct NoConversionRule {
    /// Name of the requested output type.
    pub to: &'static str,
}

impl ErrorCode for NoConversionRule {
    fn code(&self) -> &'static str {
        "CONVERT_NO_RULE"
    }

    fn is_recoverable(&self) -> bool {
        // The missing rule may be registered later.
        true
    }
}

/// A type-erased unary conversion.
///
/// Implementations are almost always created through
/// [`ConversionTable::define`]; the trait exists so tables can store
/// heterogeneous rules and callers can hold them without knowing the
/// types involved.
pub trait ConversionRule: Send + Sync {
    /// `TypeId` of the accepted input type.
    fn input_type(&self) -> TypeId;

    /// `TypeId` of the produced output type.
    fn output_type(&self) -> TypeId;

    /// Converts a type-erased input. Returns `None` when the input is
    /// not of the accepted type.
    fn convert_any(&self, input: &dyn Any) -> Option<Box<dyn Any + Send + Sync>>;
}

/// A rule backed by a plain function or closure, with the type pair
/// inferred from its signature.
struct FnRule<F, I, O> {
    func: F,
    _types: PhantomData<fn(&I) -> O>,
}

impl<F, I, O> ConversionRule for FnRule<F, I, O>
where
    F: Fn(&I) -> O + Send + Sync,
    I: 'static,
    O: Send + Sync + 'static,
{
    fn input_type(&self) -> TypeId {
        TypeId::of::<I>()
    }

    fn output_type(&self) -> TypeId {
        TypeId::of::<O>()
    }

    fn convert_any(&self, input: &dyn Any) -> Option<Box<dyn Any + Send + Sync>> {
        let typed = input.downcast_ref::<I>()?;
        Some(Box::new((self.func)(typed)))
    }
}

/// A weak-keyed registry of conversion rules.
pub struct ConversionTable {
    rules: WeakTable<(TypeId, TypeId), dyn ConversionRule>,
}

impl ConversionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> ConversionTable {
        ConversionTable {
            rules: WeakTable::new(),
        }
    }

    /// Registers a conversion, inferring the type pair from the
    /// functor's signature. Replaces any previous rule for the pair.
    ///
    /// The returned handle owns the rule; dropping it unregisters the
    /// conversion.
    #[must_use]
    pub fn define<I, O, F>(&self, func: F) -> Arc<dyn ConversionRule>
    where
        F: Fn(&I) -> O + Send + Sync + 'static,
        I: 'static,
        O: Send + Sync + 'static,
    {
        let rule: Arc<dyn ConversionRule> = Arc::new(FnRule {
            func,
            _types: PhantomData,
        });
        self.rules
            .set((rule.output_type(), rule.input_type()), Arc::downgrade(&rule));
        rule
    }

    /// Looks up the live rule for an exact type pair.
    #[must_use]
    pub fn find_rule(&self, to: TypeId, from: TypeId) -> Option<Arc<dyn ConversionRule>> {
        self.rules.find(&(to, from))
    }

    /// Converts a value to `To` using the registered rule.
    ///
    /// # Errors
    ///
    /// [`NoConversionRule`] when no live rule covers the pair.
    pub fn convert<To: Send + Sync + 'static>(
        &self,
        from: &dyn Any,
    ) -> Result<To, NoConversionRule> {
        let missing = || NoConversionRule {
            to: std::any::type_name::<To>(),
        };
        let rule = self
            .find_rule(TypeId::of::<To>(), from.type_id())
            .ok_or_else(missing)?;
        let boxed = rule.convert_any(from).ok_or_else(missing)?;
        boxed.downcast::<To>().map(|b| *b).map_err(|_| missing())
    }

    /// Converts a value to `To`, substituting `default` when no rule
    /// covers the pair.
    #[must_use]
    pub fn try_convert<To: Send + Sync + 'static>(&self, from: &dyn Any, default: To) -> To {
        self.convert(from).unwrap_or(default)
    }
}

impl Default for ConversionTable {
    fn default() -> Self {
        ConversionTable::new()
    }
}

/// The process-wide conversion table.
///
/// Initialised lazily on first use and lives for the rest of the
/// process. Registered rules still expire with their handles; only the
/// (then empty) table itself persists.
#[must_use]
pub fn conversion_rules() -> &'static ConversionTable {
    static TABLE: OnceLock<ConversionTable> = OnceLock::new();
    TABLE.get_or_init(ConversionTable::new)
}

/// Registers a rule in the process-wide table. See
/// [`ConversionTable::define`].
#[must_use]
pub fn define_conversion<I, O, F>(func: F) -> Arc<dyn ConversionRule>
where
    F: Fn(&I) -> O + Send + Sync + 'static,
    I: 'static,
    O: Send + Sync + 'static,
{
    conversion_rules().define(func)
}

/// Converts through the process-wide table. See
/// [`ConversionTable::convert`].
pub fn convert<To: Send + Sync + 'static>(from: &dyn Any) -> Result<To, NoConversionRule> {
    conversion_rules().convert(from)
}

/// Converts through the process-wide table with a fallback. See
/// [`ConversionTable::try_convert`].
#[must_use]
pub fn try_convert<To: Send + Sync + 'static>(from: &dyn Any, default: To) -> To {
    conversion_rules().try_convert(from, default)
}

// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

use std::{borrow::Cow, fmt::Display};

pub type Result<T> = ::std::result::Result<T, Error>;

/// Broad category an [`ErrorKind`] belongs to, used by the facade to pick an HTTP
/// status and decide whether the message is safe to show the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad client input. The message is always safe to expose.
    Client { status: u16 },
    /// A single-item request matched zero rows.
    NotFound,
    /// A config bug, a contract violation between components, or a passthrough
    /// adapter failure. The message is hidden from the client unless the facade
    /// is configured with `expose_errors`.
    Server { status: u16, exposed: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    // --- RequestError family (client input) ---
    /// The request named a resource that isn't in the resource map.
    UnknownResource,
    /// The selection, filter, or order referenced an attribute that doesn't exist,
    /// or exists but is `hidden` and wasn't reached via `depends`.
    UnknownAttribute,
    /// A selection option (`id`, sub-options) was used somewhere it isn't legal.
    InvalidSelectOption,
    /// A filter operator isn't in the attribute's allowed operator set.
    InvalidOperator,
    /// A filter targeted an attribute that declares no `filter` at all.
    NotFilterable,
    /// An order targeted an attribute that declares no `order`, or a direction
    /// outside its allowed set.
    NotSortable,
    /// `limit` was given on a single-resource (`id`, or a 1:1 relation) selection,
    /// `limit` exceeded `maxLimit`, or `page` was given without `limit`.
    InvalidLimit,
    /// The request named a `format` the resource's action doesn't support.
    InvalidFormat,
    /// The same query-string key appeared more than once.
    DuplicateParameter,
    /// A POST body wasn't valid JSON, or had no `Content-Type`.
    InvalidPayload,
    /// An inclusion site tried to overwrite an inherited attribute or datasource
    /// without a legal `inherit` directive.
    InvalidOverwrite,
    /// A POST body read exceeded its timeout.
    Timeout,
    /// The request named an action the resource's `actions` table doesn't
    /// declare (and it wasn't the built-in `retrieve`).
    UnknownAction,

    // --- NotFoundError ---
    /// A single-item request (`id` present) matched zero rows.
    NotFound,

    // --- ImplementationError family (config bugs / contract violations) ---
    /// An `resource` include pointed at a resource name that doesn't exist.
    UnknownIncludedResource,
    /// Following `resource` includes would recurse past the depth limit.
    InclusionDepthExceeded,
    /// The final resource (after following includes) declares no datasources.
    NoDataSources,
    /// A key, filter, order, or map referenced a datasource not declared on the
    /// resource, or the primary datasource didn't map every primary key attribute.
    ConfigInvariantViolated,
    /// The executor returned no raw result at all for a datasource the resolver
    /// planned for — a contract violation between C3 and C4.
    MissingDataSourceResult,
    /// A `valueFromSubFilter` placeholder has no matching sibling `subFilters` entry.
    MissingSubFilter,
    /// `getPlugin` was called with a name nothing ever `register`ed.
    UnknownPlugin,

    // --- DataError family (bad backend data) ---
    /// A raw result row was missing one of the columns named in its `childKey`.
    MissingKeyColumn,
    /// A row was missing a column the resolved config expected to project.
    MissingColumn,

    // --- AdapterError ---
    /// Passthrough from a datasource adapter's `prepare`/`process` call.
    Adapter,
}

impl ErrorKind {
    pub fn category(self) -> ErrorCategory {
        use ErrorKind::*;
        match self {
            UnknownResource | UnknownAttribute | InvalidSelectOption | InvalidOperator
            | NotFilterable | NotSortable | InvalidLimit | InvalidFormat
            | DuplicateParameter | InvalidPayload | InvalidOverwrite | Timeout
            | UnknownAction => ErrorCategory::Client { status: 400 },
            NotFound => ErrorCategory::NotFound,
            UnknownIncludedResource | InclusionDepthExceeded | NoDataSources
            | ConfigInvariantViolated | MissingDataSourceResult | MissingSubFilter
            | UnknownPlugin => {
                ErrorCategory::Server {
                    status: 500,
                    exposed: false,
                }
            }
            MissingKeyColumn | MissingColumn => ErrorCategory::Server {
                status: 500,
                exposed: false,
            },
            Adapter => ErrorCategory::Server {
                status: 500,
                exposed: false,
            },
        }
    }

    pub fn with_source(self, source: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::from(self).with_source(source)
    }

    pub fn with_message(self, message: impl Into<Cow<'static, str>>) -> Error {
        Error::from(self).with_message(message)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use ErrorKind::*;
        let text = match self {
            UnknownResource => "unknown resource",
            UnknownAttribute => "unknown attribute",
            InvalidSelectOption => "invalid selection option",
            InvalidOperator => "operator not allowed for this attribute",
            NotFilterable => "attribute is not filterable",
            NotSortable => "attribute is not sortable",
            InvalidLimit => "invalid limit",
            InvalidFormat => "invalid format",
            DuplicateParameter => "duplicate parameter",
            InvalidPayload => "invalid payload",
            InvalidOverwrite => "invalid attribute or datasource overwrite",
            Timeout => "timeout",
            UnknownAction => "unknown action",
            NotFound => "requested item not found",
            UnknownIncludedResource => "unknown included resource",
            InclusionDepthExceeded => "resource inclusion depth too big",
            NoDataSources => "no datasources defined in resource",
            ConfigInvariantViolated => "resource config violates an invariant",
            MissingDataSourceResult => "missing datasource result",
            MissingSubFilter => "missing sub-filter",
            UnknownPlugin => "unknown plugin",
            MissingKeyColumn => "row is missing a key column",
            MissingColumn => "row is missing a mapped column",
            Adapter => "datasource adapter error",
        };
        write!(f, "{text}")
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    message: Option<Cow<'static, str>>,
    /// Whether this specific occurrence is recoverable (only meaningful for the
    /// `DataError` family — see §4.3 point 2 of the spec: a missing secondary row
    /// with a non-null parent key is logged at debug and surfaces as `null`,
    /// rather than aborting the request).
    recoverable: bool,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            source: None,
            message: None,
            recoverable: false,
        }
    }
}

impl Error {
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn recoverable(mut self) -> Self {
        self.recoverable = true;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{message}"),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let source = self.source.as_ref()?;
        Some(&**source)
    }
}

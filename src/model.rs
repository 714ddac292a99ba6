//! Document model for the Parasol pipeline.
//!
//! Plain data shapes shared by every parser, the layer classifier, the
//! duplication analyzer and the consolidator. Nothing in here performs I/O.

mod api;
mod db;
mod document;
mod domain;
mod integration;
mod operation;

pub use api::{ApiEndpoint, ApiParameter, ApiResponse, ApiSchema, ApiSpec};
pub use db::{DbColumn, DbConstraint, DbConstraintKind, DbIndex, DbSchema, DbTable, ForeignReference};
pub use document::{DocumentKind, Layer, PageLayer, SpecDocument, UseCaseScope};
pub use domain::{
    Aggregate, BusinessRule, DomainEvent, DomainLanguage, DomainService, Entity, Method, Property,
    ValueObject,
};
pub use integration::{
    ApiCall, EventSpec, IntegrationDependency, IntegrationSpec, SagaParticipant, SagaPattern,
    SagaStep, SagaStyle,
};
pub use operation::{
    BusinessOperation, BusinessState, Page, TestCase, TestDefinition, UiField, UseCase,
    UseCaseStub,
};

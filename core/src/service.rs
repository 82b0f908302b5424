//! A local-looking service whose implementation lives on another node.

use crate::dispatcher::{CallDescriptor, Dispatcher, Operation, Payload};
use crate::error::RemoteError;
use crate::http::ResponseBody;
use crate::params::ParameterBag;
use crate::translate::translate_dispatch;
use crate::url::ResourceId;

/// The six service verbs over one resource path.
///
/// Every verb is exactly one `Dispatcher::send`; failures come back as
/// `RemoteError`.
#[derive(Debug, Clone)]
pub struct RemoteService {
    path: String,
    dispatcher: Dispatcher,
}

impl RemoteService {
    pub fn new(path: impl Into<String>, dispatcher: Dispatcher) -> Self {
        Self {
            path: path.into(),
            dispatcher,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Marks the service as backed by another node.
    pub fn is_remote(&self) -> bool {
        true
    }

    pub async fn find(&self, params: ParameterBag) -> Result<ResponseBody, RemoteError> {
        self.call(CallDescriptor::new(Operation::Find, &self.path, params))
            .await
    }

    pub async fn get(
        &self,
        id: impl Into<ResourceId>,
        params: ParameterBag,
    ) -> Result<ResponseBody, RemoteError> {
        self.call(CallDescriptor::new(Operation::Get, &self.path, params).with_id(id))
            .await
    }

    pub async fn create(
        &self,
        data: impl Into<Payload>,
        params: ParameterBag,
    ) -> Result<ResponseBody, RemoteError> {
        self.call(CallDescriptor::new(Operation::Create, &self.path, params).with_payload(data))
            .await
    }

    pub async fn update(
        &self,
        id: impl Into<ResourceId>,
        data: impl Into<Payload>,
        params: ParameterBag,
    ) -> Result<ResponseBody, RemoteError> {
        let call = CallDescriptor::new(Operation::Update, &self.path, params)
            .with_id(id)
            .with_payload(data);
        self.call(call).await
    }

    /// `id` of `None` patches the collection.
    pub async fn patch(
        &self,
        id: Option<ResourceId>,
        data: impl Into<Payload>,
        params: ParameterBag,
    ) -> Result<ResponseBody, RemoteError> {
        let mut call = CallDescriptor::new(Operation::Patch, &self.path, params).with_payload(data);
        call.id = id;
        self.call(call).await
    }

    /// `id` of `None` removes from the collection.
    pub async fn remove(
        &self,
        id: Option<ResourceId>,
        params: ParameterBag,
    ) -> Result<ResponseBody, RemoteError> {
        let mut call = CallDescriptor::new(Operation::Remove, &self.path, params);
        call.id = id;
        self.call(call).await
    }

    async fn call(&self, call: CallDescriptor) -> Result<ResponseBody, RemoteError> {
        let operation = call.operation.as_str();
        tracing::debug!(
            path = %self.path,
            operation,
            id = call.id.as_ref().map(ResourceId::as_str),
            params = %serde_json::Value::Object(self.dispatcher.filter_params(&call.params)),
            "requesting remote service"
        );

        match self.dispatcher.send(call).await {
            Ok(body) => {
                tracing::debug!(path = %self.path, operation, "remote service answered");
                Ok(body)
            }
            Err(err) => {
                let translated = translate_dispatch(&err);
                tracing::warn!(
                    path = %self.path,
                    operation,
                    kind = translated.name(),
                    status = translated.status(),
                    error = %err,
                    "remote service call failed"
                );
                Err(translated)
            }
        }
    }
}

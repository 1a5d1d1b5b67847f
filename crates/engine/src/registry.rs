//! The executor registry: one executor per node type.
//!
//! The registry is a plain value built once at startup and handed to the
//! run controller. Lookup is an exhaustive `match` over [`NodeType`], so a
//! new node type does not compile until it has an executor.

use std::sync::Arc;

use nodes::builtin::{
    AiHandler, CreatePostHandler, CronTriggerHandler, DelayHandler, DiscordHandler,
    GetPostsHandler, HttpRequestHandler, ResendHandler, TriggerHandler,
};
use nodes::{AiProvider, Guarded, HttpClient, NodeExecutor, NodeType, ProviderGateway};

use crate::EngineError;

type Slot = Arc<dyn NodeExecutor>;

pub struct ExecutorRegistry {
    initial: Slot,
    manual_trigger: Slot,
    google_form_trigger: Slot,
    stripe_trigger: Slot,
    cron_trigger: Slot,
    http_request: Slot,
    openai: Slot,
    gemini: Slot,
    deepseek: Slot,
    discord: Slot,
    resend: Slot,
    delay: Slot,
    x_create_post: Slot,
    x_get_tweet: Slot,
}

fn guarded<H: nodes::NodeHandler + 'static>(handler: H) -> Slot {
    Arc::new(Guarded(handler))
}

impl ExecutorRegistry {
    /// The built-in executors, wired to the given collaborators.
    pub fn builtin(http: Arc<dyn HttpClient>, gateway: Arc<dyn ProviderGateway>) -> Self {
        Self {
            initial: guarded(TriggerHandler::new(NodeType::Initial)),
            manual_trigger: guarded(TriggerHandler::new(NodeType::ManualTrigger)),
            google_form_trigger: guarded(TriggerHandler::new(NodeType::GoogleFormTrigger)),
            stripe_trigger: guarded(TriggerHandler::new(NodeType::StripeTrigger)),
            cron_trigger: guarded(CronTriggerHandler),
            http_request: guarded(HttpRequestHandler::new(Arc::clone(&http))),
            openai: guarded(AiHandler::new(AiProvider::OpenAi, Arc::clone(&gateway))),
            gemini: guarded(AiHandler::new(AiProvider::Gemini, Arc::clone(&gateway))),
            deepseek: guarded(AiHandler::new(AiProvider::DeepSeek, Arc::clone(&gateway))),
            discord: guarded(DiscordHandler::new(http)),
            resend: guarded(ResendHandler::new(Arc::clone(&gateway))),
            delay: guarded(DelayHandler),
            x_create_post: guarded(CreatePostHandler::new(Arc::clone(&gateway))),
            x_get_tweet: guarded(GetPostsHandler::new(gateway)),
        }
    }

    /// Replace the executor for one node type.
    #[must_use]
    pub fn with(mut self, node_type: NodeType, executor: Arc<dyn NodeExecutor>) -> Self {
        *self.slot_mut(node_type) = executor;
        self
    }

    pub fn executor_for(&self, node_type: NodeType) -> &Arc<dyn NodeExecutor> {
        match node_type {
            NodeType::Initial => &self.initial,
            NodeType::ManualTrigger => &self.manual_trigger,
            NodeType::GoogleFormTrigger => &self.google_form_trigger,
            NodeType::StripeTrigger => &self.stripe_trigger,
            NodeType::CronTrigger => &self.cron_trigger,
            NodeType::HttpRequest => &self.http_request,
            NodeType::OpenAi => &self.openai,
            NodeType::Gemini => &self.gemini,
            NodeType::DeepSeek => &self.deepseek,
            NodeType::Discord => &self.discord,
            NodeType::Resend => &self.resend,
            NodeType::Delay => &self.delay,
            NodeType::XCreatePost => &self.x_create_post,
            NodeType::XGetTweet => &self.x_get_tweet,
        }
    }

    fn slot_mut(&mut self, node_type: NodeType) -> &mut Slot {
        match node_type {
            NodeType::Initial => &mut self.initial,
            NodeType::ManualTrigger => &mut self.manual_trigger,
            NodeType::GoogleFormTrigger => &mut self.google_form_trigger,
            NodeType::StripeTrigger => &mut self.stripe_trigger,
            NodeType::CronTrigger => &mut self.cron_trigger,
            NodeType::HttpRequest => &mut self.http_request,
            NodeType::OpenAi => &mut self.openai,
            NodeType::Gemini => &mut self.gemini,
            NodeType::DeepSeek => &mut self.deepseek,
            NodeType::Discord => &mut self.discord,
            NodeType::Resend => &mut self.resend,
            NodeType::Delay => &mut self.delay,
            NodeType::XCreatePost => &mut self.x_create_post,
            NodeType::XGetTweet => &mut self.x_get_tweet,
        }
    }

    /// Resolve a stored type tag.
    ///
    /// # Errors
    /// [`EngineError::UnknownNodeType`] when the tag names no node type.
    pub fn resolve(&self, tag: &str) -> Result<(NodeType, &Arc<dyn NodeExecutor>), EngineError> {
        let node_type: NodeType = tag
            .parse()
            .map_err(|_| EngineError::UnknownNodeType(tag.to_owned()))?;
        Ok((node_type, self.executor_for(node_type)))
    }
}

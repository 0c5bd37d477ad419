//! LLM 服务 - 业务能力层
//!
//! 只负责"推理"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型（兼容 OpenAI API 的服务）
//! - 图片以 base64 data URL 的形式随用户消息发送
//! - 瞬时失败按指数退避重试

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::LlmError;
use crate::models::ImagePayload;
use crate::utils::RetryPolicy;

/// 一次推理请求
#[derive(Debug, Clone, Default)]
pub struct ReasoningRequest {
    /// 系统指令
    pub system: String,
    /// 用户输入（调用方负责控制长度）
    pub user: String,
    pub images: Vec<ImagePayload>,
}

impl ReasoningRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<ImagePayload>) -> Self {
        self.images = images;
        self
    }
}

/// 推理服务
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// 返回模型的文本回复（已去除首尾空白）
    async fn complete(&self, request: &ReasoningRequest) -> Result<String, LlmError>;
}

/// LLM 服务
///
/// 职责：
/// - 调用 LLM API 完成单次推理
/// - 不出现 paper_id / 阶段信息
/// - 不关心流程顺序
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
            retry: RetryPolicy::from_config(config),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// 构建 Chat Completion 请求
    fn build_request(
        &self,
        request: &ReasoningRequest,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let invalid = |e: async_openai::error::OpenAIError| LlmError::InvalidRequest(e.to_string());

        let mut messages = Vec::new();

        if !request.system.is_empty() {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system.as_str())
                .build()
                .map_err(invalid)?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = if request.images.is_empty() {
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user.as_str())
                .build()
                .map_err(invalid)?
        } else {
            let mut content_parts = vec![ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: request.user.clone(),
                },
            )];
            for image in &request.images {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: to_data_url(image),
                            detail: Some(ImageDetail::Auto),
                        },
                    },
                ));
            }
            debug!("使用 Vision API，包含 {} 张图片", request.images.len());

            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                .build()
                .map_err(invalid)?
        };
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(invalid)
    }

    async fn call_once(&self, request: CreateChatCompletionRequest) -> Result<String, LlmError> {
        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            LlmError::ApiCallFailed {
                model: self.model_name.clone(),
                message: e.to_string(),
            }
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl ReasoningService for LlmService {
    async fn complete(&self, request: &ReasoningRequest) -> Result<String, LlmError> {
        debug!(
            "调用 LLM API，模型: {}，用户消息 {} 字符",
            self.model_name,
            request.user.chars().count()
        );

        let chat_request = self.build_request(request)?;
        self.retry
            .retry("llm_completion", || self.call_once(chat_request.clone()))
            .await
    }
}

/// 图片转为 data URL
pub fn to_data_url(image: &ImagePayload) -> String {
    format!(
        "data:{};base64,{}",
        image.media_type,
        STANDARD.encode(&image.data)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            llm_api_key: "sk-test".to_string(),
            llm_api_base_url: "http://localhost:1/v1".to_string(),
            llm_model_name: "test-model".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_data_url() {
        let image = ImagePayload {
            label: "Figure 1".to_string(),
            media_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        };
        assert_eq!(to_data_url(&image), "data:image/png;base64,AQID");
    }

    #[test]
    fn test_build_request_with_images() {
        let service = LlmService::new(&test_config());
        let request = ReasoningRequest::new("system", "user").with_images(vec![ImagePayload {
            label: "Figure 1".to_string(),
            media_type: "image/png".to_string(),
            data: vec![0; 4],
        }]);

        let built = service.build_request(&request).unwrap();
        assert_eq!(built.model, "test-model");
        assert_eq!(built.messages.len(), 2);
    }

    #[test]
    fn test_build_request_without_system() {
        let service = LlmService::new(&test_config());
        let built = service
            .build_request(&ReasoningRequest::new("", "hello"))
            .unwrap();
        assert_eq!(built.messages.len(), 1);
    }

    /// 需要真实的 API Key：
    /// ```bash
    /// LLM_API_KEY=... cargo test test_real_completion -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_real_completion() {
        let _ = tracing_subscriber::fmt::try_init();
        let config = Config::from_env().unwrap();
        let service = LlmService::new(&config);

        let response = service
            .complete(&ReasoningRequest::new(
                "You are a concise assistant.",
                "Reply with the single word: ready",
            ))
            .await
            .unwrap();
        println!("LLM 响应: {}", response);
        assert!(!response.is_empty());
    }
}

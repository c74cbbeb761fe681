pub mod classifier;
pub mod contracts;
pub mod gateway;
pub mod openrouter;
pub mod prompts;
pub mod validation;

pub use classifier::{
    ClassificationContext, ClassificationError, ClassifiedEvent, EventClassifier,
    extract_json_object, parse_classification,
};
pub use contracts::{
    CLASSIFICATION_CONTRACT_VERSION_V1, ClassificationEnvelope, ContractError, envelope_schema,
    event_data_schema,
};
pub use gateway::{
    LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest, LlmGatewayResponse,
    LlmTokenUsage,
};
pub use openrouter::{OpenRouterConfigError, OpenRouterGateway, OpenRouterGatewayConfig};
pub use prompts::{PromptTemplate, classification_context, classification_template};
pub use validation::{
    OutputValidationError, validate_envelope_json, validate_envelope_value, validate_event_data,
};

//! GraphQL documents sent to the chat backend.

pub const START_CHAT: &str = r#"
mutation StartChat($chatbotId: Int!) {
  startChat(chatbotId: $chatbotId)
}
"#;

pub const CHAT: &str = r#"
mutation Chat($input: String!, $file: String!, $conversationId: Int!, $chatbotId: Int!) {
  chat(input: $input, file: $file, conversationId: $conversationId, chatbotId: $chatbotId)
}
"#;

pub const GET_CHATBOT_DETAIL: &str = r#"
query GetChatbotDetail($id: Int!) {
  getChatbotDetail(id: $id) {
    id
    name
    displayName
    message
    initialMessage
    suggestedMessages
    theme
    chatbotProfilePicture
    removeProfilePicture
    userMessageColor
    file
    rateLimiting
    tooManyRequestsMessage
    collectUserName
    collectUserEmail
    collectUserPhone
    collectUserMessage
  }
}
"#;

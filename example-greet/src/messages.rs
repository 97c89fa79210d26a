//! Greeting messages. The package is `greet`.

macro_rules! named {
    ($($message:ident),* $(,)?) => {
        $(
            impl prost::Name for $message {
                const NAME: &'static str = stringify!($message);
                const PACKAGE: &'static str = "greet";
            }
        )*
    };
}

named!(
    Greeting,
    GreetRequest,
    GreetResponse,
    GreetManyTimesRequest,
    GreetManyTimesResponse,
    LongGreetRequest,
    LongGreetResponse,
    GreetEveryoneRequest,
    GreetEveryoneResponse,
    GreetWithDeadlineRequest,
    GreetWithDeadlineResponse,
);

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Greeting {
    #[prost(string, tag = "1")]
    pub first_name: String,
    #[prost(string, tag = "2")]
    pub last_name: String,
}

impl Greeting {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct GreetRequest {
    #[prost(message, optional, tag = "1")]
    pub greeting: Option<Greeting>,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct GreetResponse {
    #[prost(string, tag = "1")]
    pub result: String,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct GreetManyTimesRequest {
    #[prost(message, optional, tag = "1")]
    pub greeting: Option<Greeting>,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct GreetManyTimesResponse {
    #[prost(string, tag = "1")]
    pub result: String,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct LongGreetRequest {
    #[prost(message, optional, tag = "1")]
    pub greeting: Option<Greeting>,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct LongGreetResponse {
    #[prost(string, tag = "1")]
    pub result: String,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct GreetEveryoneRequest {
    #[prost(message, optional, tag = "1")]
    pub greeting: Option<Greeting>,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct GreetEveryoneResponse {
    #[prost(string, tag = "1")]
    pub result: String,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct GreetWithDeadlineRequest {
    #[prost(message, optional, tag = "1")]
    pub greeting: Option<Greeting>,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct GreetWithDeadlineResponse {
    #[prost(string, tag = "1")]
    pub result: String,
}

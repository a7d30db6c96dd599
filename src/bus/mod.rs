/// 인스턴스 간 방송 버스
/// 방송 의도를 auction_events 토픽으로 중계해 여러 엔진 인스턴스의 허브를
/// 일관되게 유지한다. 영속 이벤트 로그가 진실의 원천이고 버스는 가속기일
/// 뿐이므로, 버스 장애 시에도 로컬 방송과 리플레이는 그대로 동작한다.
// region:    --- Imports
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::hub::messages::BroadcastIntent;
use crate::hub::{Hub, IntentPublisher};

// endregion: --- Imports

/// 방송 의도 토픽
pub const INTENT_TOPIC: &str = "auction_events";

// region:    --- Envelope
/// 버스에 실리는 봉투. instance_id 로 자기 발행분 재수신을 거른다.
#[derive(Debug, Serialize, Deserialize)]
pub struct BusEnvelope {
    pub instance_id: String,
    pub intent: BroadcastIntent,
}
// endregion: --- Envelope

// region:    --- Kafka Producer
#[derive(Clone)]
pub struct KafkaProducer {
    producer: Arc<FutureProducer>,
}

/// KafkaProducer 구현
impl KafkaProducer {
    pub fn new(brokers: &str) -> Self {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .expect("Producer creation error");

        KafkaProducer {
            producer: Arc::new(producer),
        }
    }

    /// 메시지 전송
    pub async fn send_message(&self, topic: &str, key: &str, value: &str) -> Result<(), String> {
        let record = FutureRecord::to(topic).key(key).payload(value);

        self.producer
            .send(record, std::time::Duration::from_secs(0))
            .await
            .map_err(|(e, _)| format!("Error sending message: {:?}", e))?;

        Ok(())
    }
}
// endregion: --- Kafka Producer

// region:    --- Intent Publisher
/// 허브가 사용하는 의도 발행자
pub struct KafkaIntentPublisher {
    producer: KafkaProducer,
    instance_id: String,
}

impl KafkaIntentPublisher {
    pub fn new(producer: KafkaProducer, instance_id: String) -> Arc<Self> {
        Arc::new(Self {
            producer,
            instance_id,
        })
    }
}

#[async_trait::async_trait]
impl IntentPublisher for KafkaIntentPublisher {
    async fn publish_intent(&self, intent: &BroadcastIntent) -> Result<(), EngineError> {
        let envelope = BusEnvelope {
            instance_id: self.instance_id.clone(),
            intent: intent.clone(),
        };
        let payload = serde_json::to_string(&envelope)
            .map_err(|e| EngineError::BusUnavailable(e.to_string()))?;

        self.producer
            .send_message(INTENT_TOPIC, &intent.auction_id.to_string(), &payload)
            .await
            .map_err(EngineError::BusUnavailable)
    }
}
// endregion: --- Intent Publisher

// region:    --- Kafka Consumer
pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
}

/// KafkaConsumer 구현
impl KafkaConsumer {
    pub fn new(brokers: &str, group_id: &str) -> Self {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .set("session.timeout.ms", "6000")
            .set("allow.auto.create.topics", "true")
            .create()
            .expect("Consumer creation failed");

        KafkaConsumer {
            consumer: Arc::new(consumer),
        }
    }

    /// 버스 소비 루프: 타 인스턴스의 의도를 로컬 허브에 재적재한다
    pub async fn consume_intents(&self, hub: Arc<Hub>, instance_id: String) {
        info!(
            "{:<12} --> 버스 소비 시작: topic={}",
            "Bus", INTENT_TOPIC
        );
        if let Err(e) = self.consumer.subscribe(&[INTENT_TOPIC]) {
            error!("{:<12} --> 토픽 구독 실패: {:?}", "Bus", e);
            return;
        }

        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    let Some(payload) = message.payload() else {
                        warn!("{:<12} --> 빈 페이로드 수신", "Bus");
                        continue;
                    };

                    match serde_json::from_slice::<BusEnvelope>(payload) {
                        Ok(envelope) => {
                            // 자기 발행분은 이미 로컬로 처리됨
                            if envelope.instance_id == instance_id {
                                continue;
                            }
                            hub.queue_intent(envelope.intent);
                        }
                        Err(e) => error!("{:<12} --> deserialize 오류: {:?}", "Bus", e),
                    }
                }
                Err(e) => error!("{:<12} --> 메시지 수신 오류: {:?}", "Bus", e),
            }
        }
    }
}
// endregion: --- Kafka Consumer

// region:    --- Kafka Manager
pub struct KafkaManager {
    producer: KafkaProducer,
    consumer: Arc<KafkaConsumer>,
    brokers: String,
}

/// KafkaManager 구현
impl KafkaManager {
    pub fn new(brokers: &str) -> Self {
        let group_id = format!("auction-engine-{}", std::process::id());

        KafkaManager {
            producer: KafkaProducer::new(brokers),
            consumer: Arc::new(KafkaConsumer::new(brokers, &group_id)),
            brokers: brokers.to_string(),
        }
    }

    /// 프로듀서 반환
    pub fn get_producer(&self) -> KafkaProducer {
        self.producer.clone()
    }

    /// 컨슈머 반환
    pub fn get_consumer(&self) -> Arc<KafkaConsumer> {
        Arc::clone(&self.consumer)
    }

    /// 토픽 생성
    pub async fn create_topic(
        &self,
        topic_name: &str,
        num_partitions: i32,
        replication_factor: i32,
    ) -> Result<(), String> {
        info!("{:<12} --> 토픽 생성 시작: {}", "Bus", topic_name);

        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()
            .map_err(|e| format!("AdminClient 생성 실패: {:?}", e))?;

        let new_topic = NewTopic::new(
            topic_name,
            num_partitions,
            TopicReplication::Fixed(replication_factor),
        );

        match admin_client
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
        {
            Ok(_) => {
                info!("{:<12} --> 토픽 생성 성공: {}", "Bus", topic_name);
                Ok(())
            }
            Err(e) => {
                error!("{:<12} --> 토픽 생성 실패: {:?}", "Bus", e);
                Err(format!("토픽 생성 실패: {:?}", e))
            }
        }
    }
}
// endregion: --- Kafka Manager

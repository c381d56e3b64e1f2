//! # Módulo de Protocolo - Fronteiras de Comunicação do Robô
//!
//! Este módulo define todas as **estruturas de dados** que cruzam as três
//! fronteiras externas do centro de controle, e as traduções de encoding
//! que acontecem exatamente nessas fronteiras (nunca dentro da lógica de
//! missão).
//!
//! ## As três fronteiras:
//!
//! ```text
//!                 ┌───────────────────────────────┐
//!   Operador ◀───▶│                               │───▶ Route Planner (HTTP)
//!   (JSON/linha)  │       Centro de Controle      │
//!                 │                               │───▶ Image Recogniser (HTTP)
//!   Motores  ◀───▶│                               │
//!   (frames ;)    └───────────────────────────────┘
//! ```
//!
//! ## Traduções de fronteira:
//!
//! - **Coordenadas**: o operador fala em grade 1-indexada; internamente
//!   tudo é 0-indexado. Subtraímos 1 na entrada e somamos 1 na saída.
//! - **Direções**: o operador envia `1=N, 2=E, 3=S, 4=W`; internamente
//!   usamos `{0,2,4,6}` (fórmula `(d-1)*2`). Mensagens `ROBOT` usam o
//!   encoding textual de 8 pontos (`N`, `NE`, `E`, ...).
//! - **Comandos**: o planner devolve tokens compactos (`FW10`, `SP1`);
//!   o controlador de motores recebe frames `:id/MOTOR/VERBO/vel/valor;`.
//!
//! Manter essas traduções aqui (e só aqui) evita que o resto do código
//! precise saber qual convenção cada colaborador externo usa.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::errors::ControlError;

// ============================================================================
// MODELO DE DADOS DA MISSÃO
// ============================================================================

/// Um obstáculo do mapa, já no sistema interno (0-indexado).
///
/// `d` é a face visível a fotografar: `0=N, 2=E, 4=S, 6=W`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obstacle {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub d: i32,
}

/// Pose da grade onde o robô deve estar ao fotografar um obstáculo.
///
/// O planner pode devolver `d` em qualquer um dos 8 pontos cardeais
/// (0..8); a pose sentinela `(-1,-1,-1)` marca "pose desconhecida".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapPosition {
    pub x: i32,
    pub y: i32,
    pub d: i32,
}

impl SnapPosition {
    /// Pose usada quando o planner devolve menos poses que snapshots.
    pub const SENTINEL: Self = Self { x: -1, y: -1, d: -1 };
}

/// Um comando da rota, já decodificado do token do planner.
///
/// Valores são distâncias (movimentos) ou ângulos (giros) inteiros;
/// `Snapshot` carrega o id do obstáculo a fotografar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    MoveForward(i32),
    MoveBackward(i32),
    TurnLeft(i32),
    TurnRight(i32),
    Snapshot(u32),
}

impl Command {
    /// Decodifica um token de rota do planner.
    ///
    /// Tokens reconhecidos: `FW<n>`, `BW<n>`, `FL<n>` (giro à esquerda),
    /// `FR<n>` (giro à direita), `SP<id>`. Qualquer outro token é erro de
    /// protocolo e invalida o plano inteiro.
    pub fn from_route_token(token: &str) -> Result<Self, ControlError> {
        let (prefix, rest) = match (token.get(..2), token.get(2..)) {
            (Some(prefix), Some(rest)) => (prefix, rest),
            _ => return Err(ControlError::protocol(format!("bad route token '{token}'"))),
        };
        let value: i64 = rest
            .parse()
            .map_err(|_| ControlError::protocol(format!("bad route token '{token}'")))?;
        match prefix {
            "FW" => Ok(Self::MoveForward(value as i32)),
            "BW" => Ok(Self::MoveBackward(value as i32)),
            "FL" => Ok(Self::TurnLeft(value as i32)),
            "FR" => Ok(Self::TurnRight(value as i32)),
            "SP" => Ok(Self::Snapshot(value as u32)),
            _ => Err(ControlError::protocol(format!(
                "unknown route token '{token}'"
            ))),
        }
    }
}

/// A rota de uma missão: comandos em ordem + poses de snapshot pareadas.
///
/// O n-ésimo `Snapshot` do plano corresponde à n-ésima pose. Quando o
/// planner devolve menos poses que snapshots, o executor usa
/// [`SnapPosition::SENTINEL`]; poses sobrando ficam sem uso.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub commands: Vec<Command>,
    pub snap_positions: Vec<SnapPosition>,
}

impl Plan {
    pub fn snapshot_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Snapshot(_)))
            .count()
    }
}

/// O mapa de uma missão, já traduzido para o sistema interno.
#[derive(Debug, Clone, Default)]
pub struct ArenaMap {
    pub obstacles: Vec<Obstacle>,
    pub robot_x: i32,
    pub robot_y: i32,
    pub robot_dir: i32,
    pub retrying: bool,
}

// ============================================================================
// TRADUÇÕES DE DIREÇÃO E COORDENADA
// ============================================================================

/// Encoding textual de 8 pontos para as mensagens `ROBOT`.
pub const HEADINGS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Converte a direção do operador (`1=N..4=W`) para o encoding interno
/// (`{0,2,4,6}`). Valores fora de 1..=4 caem para Norte, com log.
pub fn operator_dir_to_internal(d: i64) -> i32 {
    match d {
        1..=4 => ((d - 1) * 2) as i32,
        other => {
            warn!(dir = other, "Unknown operator direction, defaulting to N");
            0
        }
    }
}

/// Nome textual de uma direção interna; fora de `[0,8)` vira `"U"`.
pub fn heading_str(d: i32) -> &'static str {
    usize::try_from(d)
        .ok()
        .and_then(|i| HEADINGS.get(i).copied())
        .unwrap_or("U")
}

// ============================================================================
// FRONTEIRA DO OPERADOR - ENTRADA
// ============================================================================

/// Envelope bruto de uma mensagem do operador.
///
/// Toda mensagem é um objeto JSON com um campo `cat`; o `value` (quando
/// presente) só é interpretado depois da classificação, para que uma
/// categoria desconhecida possa ser reconhecida e respondida mesmo com um
/// payload que não sabemos decodificar.
#[derive(Debug, Deserialize)]
pub struct OperatorEnvelope {
    pub cat: String,
    #[serde(default)]
    pub value: Option<Value>,
}

impl OperatorEnvelope {
    pub fn parse(line: &str) -> Result<Self, ControlError> {
        serde_json::from_str(line)
            .map_err(|e| ControlError::protocol(format!("operator frame: {e}")))
    }
}

/// Payload de `sendArena`, ainda nas convenções do operador (1-indexado,
/// direção 1..4). Os obstáculos ficam como `Value` cru para que um item
/// inválido possa ser pulado sem derrubar o mapa inteiro.
#[derive(Debug, Deserialize)]
pub struct ArenaPayload {
    #[serde(default)]
    pub obstacles: Vec<Value>,
    #[serde(default = "one")]
    pub robot_x: i64,
    #[serde(default = "one")]
    pub robot_y: i64,
    #[serde(default = "one", alias = "robot_dir")]
    pub robot_direction: i64,
    #[serde(default)]
    pub retrying: bool,
}

fn one() -> i64 {
    1
}

/// Forma intermediária de um obstáculo como o operador o descreve.
#[derive(Debug, Deserialize)]
struct OperatorObstacle {
    id: u32,
    x: i64,
    y: i64,
    d: i32,
}

impl ArenaPayload {
    pub fn parse(value: Value) -> Result<Self, ControlError> {
        serde_json::from_value(value)
            .map_err(|e| ControlError::protocol(format!("arena payload: {e}")))
    }

    /// Traduz o payload para o sistema interno.
    ///
    /// Coordenadas perdem 1 (1-indexado → 0-indexado); a direção do robô
    /// é remapeada; a face `d` dos obstáculos já chega no encoding interno
    /// e passa direto. Obstáculos que não decodificam são pulados um a um.
    pub fn into_map(self) -> ArenaMap {
        let mut obstacles = Vec::with_capacity(self.obstacles.len());
        for raw in self.obstacles {
            match serde_json::from_value::<OperatorObstacle>(raw.clone()) {
                Ok(o) => obstacles.push(Obstacle {
                    id: o.id,
                    x: (o.x - 1) as i32,
                    y: (o.y - 1) as i32,
                    d: o.d,
                }),
                Err(e) => {
                    warn!(error = %e, raw = %raw, "Skipping unparseable obstacle");
                }
            }
        }
        ArenaMap {
            obstacles,
            robot_x: (self.robot_x - 1) as i32,
            robot_y: (self.robot_y - 1) as i32,
            robot_dir: operator_dir_to_internal(self.robot_direction),
            retrying: self.retrying,
        }
    }
}

static DIRECT_DRIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(FW|BW|TL|TR|FL|FR)(\d{1,5})$").expect("valid direct drive regex"));

/// Decodifica um comando direto de motor vindo do operador (`cat=stm`).
///
/// `FL`/`FR` são aliases de `TL`/`TR`.
pub fn parse_direct_drive(token: &str) -> Result<Command, ControlError> {
    let caps = DIRECT_DRIVE_RE
        .captures(token.trim())
        .ok_or_else(|| ControlError::protocol(format!("direct drive token '{token}'")))?;
    let value: i32 = caps[2]
        .parse()
        .map_err(|_| ControlError::protocol(format!("direct drive value in '{token}'")))?;
    Ok(match &caps[1] {
        "FW" => Command::MoveForward(value),
        "BW" => Command::MoveBackward(value),
        "TL" | "FL" => Command::TurnLeft(value),
        _ => Command::TurnRight(value),
    })
}

// ============================================================================
// FRONTEIRA DO OPERADOR - SAÍDA
// ============================================================================

/// Moldura textual: o texto entre aspas, terminado por newline.
///
/// É o formato das mensagens semânticas (`ROBOT,...`, `TARGET,...`) e dos
/// status de missão.
pub fn frame_text(text: &str) -> String {
    format!("\"{text}\"\n")
}

/// Ack estruturado devolvido para cada mensagem do operador.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OperatorAck {
    pub cat: String,
    pub status: String,
}

impl OperatorAck {
    pub fn new(cat: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            cat: cat.into(),
            status: status.into(),
        }
    }

    /// Serializa para uma linha de protocolo.
    pub fn to_line(&self) -> String {
        // Display de Value produz JSON compacto sem poder falhar, o que
        // cobre `cat` ecoado com caracteres que precisem de escape.
        let value = serde_json::json!({ "cat": self.cat, "status": self.status });
        format!("{value}\n")
    }
}

/// Mensagem `ROBOT,<x>,<y>,<DIR>` (volta para 1-indexado na saída).
pub fn robot_report(pose: &SnapPosition) -> String {
    format!(
        "ROBOT,{},{},{}",
        pose.x + 1,
        pose.y + 1,
        heading_str(pose.d)
    )
}

/// Mensagem `TARGET,<obstacle_id>,<img_id>`.
pub fn target_report(obstacle_id: u32, img_id: i64) -> String {
    format!("TARGET,{obstacle_id},{img_id}")
}

// ============================================================================
// FRONTEIRA DO CONTROLADOR DE MOTORES
// ============================================================================

/// Verbos aceitos pelo controlador de motores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionVerb {
    Fwd,
    Bwd,
    TurnL,
    TurnR,
}

impl MotionVerb {
    fn wire(self) -> &'static str {
        match self {
            Self::Fwd => "FWD",
            Self::Bwd => "BWD",
            Self::TurnL => "TURNL",
            Self::TurnR => "TURNR",
        }
    }

    /// Velocidade padrão por verbo: movimentos a 70%, giros a 60%.
    fn speed_pct(self) -> u8 {
        match self {
            Self::Fwd | Self::Bwd => 70,
            Self::TurnL | Self::TurnR => 60,
        }
    }
}

/// Um frame outbound para o controlador de motores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionFrame {
    pub id: u32,
    pub verb: MotionVerb,
    pub value: i32,
}

impl MotionFrame {
    /// Monta o frame de um comando de movimento; `Snapshot` não tem frame.
    pub fn from_command(id: u32, command: &Command) -> Option<Self> {
        let (verb, value) = match *command {
            Command::MoveForward(v) => (MotionVerb::Fwd, v),
            Command::MoveBackward(v) => (MotionVerb::Bwd, v),
            Command::TurnLeft(v) => (MotionVerb::TurnL, v),
            Command::TurnRight(v) => (MotionVerb::TurnR, v),
            Command::Snapshot(_) => return None,
        };
        Some(Self { id, verb, value })
    }

    /// Encoding de linha: `:<id>/MOTOR/<verbo>/<vel%>/<valor>;`
    pub fn encode(&self) -> String {
        format!(
            ":{}/MOTOR/{}/{}/{};\n",
            self.id,
            self.verb.wire(),
            self.verb.speed_pct(),
            self.value
        )
    }
}

static MOTION_ACK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^!(\d+)/DONE;$").expect("valid motion ack regex"));

/// Reconhece um frame de conclusão `!<id>/DONE;` do controlador.
///
/// Qualquer outra linha devolve `None` e deve ser ignorada pelo chamador
/// (frames estranhos nunca travam o executor).
pub fn parse_motion_ack(line: &str) -> Option<u32> {
    MOTION_ACK_RE
        .captures(line.trim())
        .and_then(|caps| caps[1].parse().ok())
}

// ============================================================================
// FRONTEIRA DO ROUTE PLANNER
// ============================================================================

/// Corpo do POST para o planner (tudo já 0-indexado, `d` interno).
#[derive(Debug, Clone, Serialize)]
pub struct RouteRequest {
    pub obstacles: Vec<Obstacle>,
    pub robot_x: i32,
    pub robot_y: i32,
    pub robot_dir: i32,
    pub retrying: bool,
}

impl RouteRequest {
    pub fn from_map(map: &ArenaMap) -> Self {
        Self {
            obstacles: map.obstacles.clone(),
            robot_x: map.robot_x,
            robot_y: map.robot_y,
            robot_dir: map.robot_dir,
            retrying: map.retrying,
        }
    }
}

/// Envelope da resposta do planner.
#[derive(Debug, Deserialize)]
pub struct RouteResponse {
    pub data: RouteData,
}

#[derive(Debug, Deserialize)]
pub struct RouteData {
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub snap_positions: Vec<SnapPosition>,
}

impl RouteData {
    /// Decodifica os tokens em um [`Plan`]; um token desconhecido invalida
    /// a rota inteira (a missão é descartada, sem retry).
    pub fn into_plan(self) -> Result<Plan, ControlError> {
        let commands = self
            .commands
            .iter()
            .map(|t| Command::from_route_token(t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Plan {
            commands,
            snap_positions: self.snap_positions,
        })
    }
}

// ============================================================================
// FRONTEIRA DO IMAGE RECOGNISER
// ============================================================================

/// Resposta do serviço de reconhecimento.
#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionResponse {
    #[serde(default)]
    pub detected: i64,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub objects: Vec<RecognisedObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognisedObject {
    #[serde(default)]
    pub class_label: String,
    #[serde(default)]
    pub img_id: Option<i64>,
}

impl RecognisedObject {
    /// Identificador de imagem do objeto, se resolvível.
    ///
    /// Preferência: campo `img_id` quando presente e não-negativo; senão a
    /// tabela fixa de símbolos. Rótulo desconhecido → `None`.
    pub fn resolve_image_id(&self) -> Option<i64> {
        match self.img_id {
            Some(id) if id >= 0 => Some(id),
            _ => symbol_for_label(&self.class_label),
        }
    }
}

/// Tabela fixa rótulo → identificador de imagem.
///
/// Dígitos 1-9 → 11-19, letras A-H e S-Z → 20-35, setas → 36-39,
/// placa de pare → 40.
static SYMBOL_TABLE: &[(&str, i64)] = &[
    ("Number 1", 11),
    ("Number 2", 12),
    ("Number 3", 13),
    ("Number 4", 14),
    ("Number 5", 15),
    ("Number 6", 16),
    ("Number 7", 17),
    ("Number 8", 18),
    ("Number 9", 19),
    ("Alphabet A", 20),
    ("Alphabet B", 21),
    ("Alphabet C", 22),
    ("Alphabet D", 23),
    ("Alphabet E", 24),
    ("Alphabet F", 25),
    ("Alphabet G", 26),
    ("Alphabet H", 27),
    ("Alphabet S", 28),
    ("Alphabet T", 29),
    ("Alphabet U", 30),
    ("Alphabet V", 31),
    ("Alphabet W", 32),
    ("Alphabet X", 33),
    ("Alphabet Y", 34),
    ("Alphabet Z", 35),
    ("Up Arrow", 36),
    ("Down Arrow", 37),
    ("Right Arrow", 38),
    ("Left Arrow", 39),
    ("Stop sign", 40),
];

pub fn symbol_for_label(label: &str) -> Option<i64> {
    SYMBOL_TABLE
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, id)| *id)
}

// ============================================================================
// TESTES
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_route_tokens_decode() {
        assert_eq!(
            Command::from_route_token("FW10").unwrap(),
            Command::MoveForward(10)
        );
        assert_eq!(
            Command::from_route_token("BW5").unwrap(),
            Command::MoveBackward(5)
        );
        assert_eq!(
            Command::from_route_token("FL90").unwrap(),
            Command::TurnLeft(90)
        );
        assert_eq!(
            Command::from_route_token("FR90").unwrap(),
            Command::TurnRight(90)
        );
        assert_eq!(
            Command::from_route_token("SP3").unwrap(),
            Command::Snapshot(3)
        );
    }

    #[test]
    fn test_unknown_route_token_is_protocol_error() {
        assert!(Command::from_route_token("XX12").is_err());
        assert!(Command::from_route_token("FW").is_err());
        assert!(Command::from_route_token("").is_err());
    }

    #[test]
    fn test_bad_token_fails_whole_plan() {
        let data = RouteData {
            commands: vec!["FW10".into(), "ZZ1".into()],
            snap_positions: vec![],
        };
        assert!(data.into_plan().is_err());
    }

    #[test]
    fn test_motion_frame_encoding() {
        let frame = MotionFrame::from_command(1, &Command::MoveForward(10)).unwrap();
        assert_eq!(frame.encode(), ":1/MOTOR/FWD/70/10;\n");

        let frame = MotionFrame::from_command(7, &Command::TurnRight(90)).unwrap();
        assert_eq!(frame.encode(), ":7/MOTOR/TURNR/60/90;\n");

        // Snapshot não vira frame de motor.
        assert!(MotionFrame::from_command(2, &Command::Snapshot(4)).is_none());
    }

    #[test]
    fn test_motion_ack_parsing() {
        assert_eq!(parse_motion_ack("!1/DONE;"), Some(1));
        assert_eq!(parse_motion_ack("  !42/DONE;\r"), Some(42));
        assert_eq!(parse_motion_ack("!x/DONE;"), None);
        assert_eq!(parse_motion_ack("1/DONE;"), None);
        assert_eq!(parse_motion_ack("garbage"), None);
    }

    #[test]
    fn test_direct_drive_tokens() {
        assert_eq!(parse_direct_drive("FW100").unwrap(), Command::MoveForward(100));
        assert_eq!(parse_direct_drive("TL90").unwrap(), Command::TurnLeft(90));
        // FL/FR são aliases dos giros.
        assert_eq!(parse_direct_drive("FL90").unwrap(), Command::TurnLeft(90));
        assert_eq!(parse_direct_drive("FR45").unwrap(), Command::TurnRight(45));
        assert!(parse_direct_drive("UP10").is_err());
        assert!(parse_direct_drive("FW").is_err());
    }

    #[test]
    fn test_arena_payload_translation() {
        let payload = ArenaPayload::parse(json!({
            "obstacles": [
                {"id": 1, "x": 2, "y": 3, "d": 2},
                {"id": 2, "x": "broken"},
                {"id": 3, "x": 5, "y": 6, "d": 6}
            ],
            "robot_x": 1,
            "robot_y": 1,
            "robot_direction": 1
        }))
        .unwrap();
        let map = payload.into_map();

        // O obstáculo inválido é pulado, os demais traduzidos.
        assert_eq!(map.obstacles.len(), 2);
        assert_eq!(
            map.obstacles[0],
            Obstacle { id: 1, x: 1, y: 2, d: 2 }
        );
        assert_eq!(map.robot_x, 0);
        assert_eq!(map.robot_y, 0);
        assert_eq!(map.robot_dir, 0);
        assert!(!map.retrying);
    }

    #[test]
    fn test_arena_payload_defaults_and_alias() {
        let map = ArenaPayload::parse(json!({
            "obstacles": [],
            "robot_dir": 3
        }))
        .unwrap()
        .into_map();
        assert_eq!((map.robot_x, map.robot_y), (0, 0));
        assert_eq!(map.robot_dir, 4); // 3 = sul
    }

    #[test]
    fn test_operator_envelope_requires_cat() {
        assert!(OperatorEnvelope::parse("{\"cat\":\"stop\"}").is_ok());
        assert!(OperatorEnvelope::parse("{\"value\":1}").is_err());
        assert!(OperatorEnvelope::parse("{\"cat\":\"sendArena\",\"value\":{").is_err());
    }

    #[test]
    fn test_operator_ack_line_shape() {
        let ack = OperatorAck::new("sendArena", "Robot is busy");
        assert_eq!(
            ack.to_line(),
            "{\"cat\":\"sendArena\",\"status\":\"Robot is busy\"}\n"
        );
    }

    #[test]
    fn test_text_frame_is_quoted_line() {
        assert_eq!(frame_text("Navigation complete."), "\"Navigation complete.\"\n");
    }

    #[test]
    fn test_robot_report_is_one_indexed_eight_way() {
        let pose = SnapPosition { x: 1, y: 2, d: 2 };
        assert_eq!(robot_report(&pose), "ROBOT,2,3,E");

        let odd = SnapPosition { x: 0, y: 0, d: 3 };
        assert_eq!(robot_report(&odd), "ROBOT,1,1,SE");

        assert_eq!(robot_report(&SnapPosition::SENTINEL), "ROBOT,0,0,U");
    }

    #[test]
    fn test_symbol_table_bounds() {
        assert_eq!(symbol_for_label("Number 1"), Some(11));
        assert_eq!(symbol_for_label("Number 9"), Some(19));
        assert_eq!(symbol_for_label("Alphabet A"), Some(20));
        assert_eq!(symbol_for_label("Alphabet Z"), Some(35));
        assert_eq!(symbol_for_label("Up Arrow"), Some(36));
        assert_eq!(symbol_for_label("Stop sign"), Some(40));
        assert_eq!(symbol_for_label("Bullseye"), None);
    }

    #[test]
    fn test_resolution_prefers_img_id() {
        let obj = RecognisedObject {
            class_label: "Number 4".into(),
            img_id: Some(14),
        };
        assert_eq!(obj.resolve_image_id(), Some(14));

        // img_id negativo cai para a tabela.
        let obj = RecognisedObject {
            class_label: "Number 4".into(),
            img_id: Some(-1),
        };
        assert_eq!(obj.resolve_image_id(), Some(14));

        let obj = RecognisedObject {
            class_label: "???".into(),
            img_id: None,
        };
        assert_eq!(obj.resolve_image_id(), None);
    }

    #[test]
    fn test_route_request_shape() {
        let map = ArenaMap {
            obstacles: vec![Obstacle { id: 1, x: 1, y: 2, d: 2 }],
            robot_x: 0,
            robot_y: 0,
            robot_dir: 0,
            retrying: false,
        };
        let body = serde_json::to_value(RouteRequest::from_map(&map)).unwrap();
        assert_eq!(
            body,
            json!({
                "obstacles": [{"id": 1, "x": 1, "y": 2, "d": 2}],
                "robot_x": 0,
                "robot_y": 0,
                "robot_dir": 0,
                "retrying": false
            })
        );
    }

    proptest! {
        // Direção do operador 1..4 sempre cai em {0,2,4,6} via (d-1)*2.
        #[test]
        fn prop_operator_dir_round_trip(d in 1i64..=4) {
            let internal = operator_dir_to_internal(d);
            prop_assert_eq!(internal as i64, (d - 1) * 2);
            prop_assert!([0, 2, 4, 6].contains(&internal));
        }

        // Ingestão subtrai 1; relatório ROBOT soma 1 de volta.
        #[test]
        fn prop_coordinates_round_trip(x in 1i64..=50, y in 1i64..=50) {
            let payload = ArenaPayload {
                obstacles: vec![],
                robot_x: x,
                robot_y: y,
                robot_direction: 1,
                retrying: false,
            };
            let map = payload.into_map();
            prop_assert_eq!(map.robot_x as i64, x - 1);
            prop_assert_eq!(map.robot_y as i64, y - 1);

            let pose = SnapPosition { x: map.robot_x, y: map.robot_y, d: 0 };
            let report = robot_report(&pose);
            prop_assert_eq!(report, format!("ROBOT,{},{},N", x, y));
        }

        // Todo frame de ack bem formado decodifica para o próprio id.
        #[test]
        fn prop_motion_ack_round_trip(id in 0u32..=u32::MAX) {
            prop_assert_eq!(parse_motion_ack(&format!("!{id}/DONE;")), Some(id));
        }

        // Tokens de movimento decodificam o valor literal.
        #[test]
        fn prop_route_tokens_keep_value(n in 0i32..=9999) {
            prop_assert_eq!(
                Command::from_route_token(&format!("FW{n}")).unwrap(),
                Command::MoveForward(n)
            );
            prop_assert_eq!(
                Command::from_route_token(&format!("FR{n}")).unwrap(),
                Command::TurnRight(n)
            );
        }
    }
}

//! Fixed-size framed text protocol: one logical message per 512-byte block.
//!
//! Request frame:  `<type><DELIM><payload>`, zero-padded to [`FRAME_SIZE`].
//! Response frame: `<type><DELIM><error><DELIM><payload>`, zero-padded.
//! `DELIM` is the literal byte sequence `"\r\n\r\n"`; payloads may contain the
//! inner delimiters `#` (record separator) and `;` (field separator).

use std::fmt;

pub const FRAME_SIZE: usize = 512;
pub const HEADER_SIZE: usize = 4;
pub const ERROR_SIZE: usize = 4;
pub const MAX_REQ_PAYLOAD: usize = FRAME_SIZE - HEADER_SIZE;
pub const MAX_RSP_PAYLOAD: usize = FRAME_SIZE - HEADER_SIZE - ERROR_SIZE;
pub const SPECTATORS_NO: usize = 5;
pub const MAX_NICK_LEN: usize = 32;

pub const MSG_DELIM: &str = "\r\n\r\n";
pub const PAYLOAD_DELIM: &str = "#";
pub const INNER_DELIM: &str = ";";

/// Every message type the wire carries, client-originated and
/// server-originated alike. Numeric values are this implementation's own
/// assignment (the historical C enum discriminants are not recoverable from
/// the distilled spec); only relative catalogue order is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MessageType {
    Login = 0,
    LoginRsp = 1,
    PlayersList = 2,
    PlayersListRsp = 3,
    GamesList = 4,
    GamesListRsp = 5,
    CreateGame = 6,
    CreateGameRsp = 7,
    ConnectGame = 8,
    ConnectGameRsp = 9,
    ConnectSpectator = 10,
    ConnectSpectatorRsp = 11,
    BackToMenu = 12,
    BackToMenuRsp = 13,
    PrintBoard = 14,
    PrintBoardRsp = 15,
    CheckTurn = 16,
    CheckTurnRsp = 17,
    MakeMove = 18,
    MakeMoveRsp = 19,
    LeaveMessage = 20,
    LeaveMessageRsp = 21,
    Leave = 22,
    LeaveRsp = 23,
    PrintBoardSpcRsp = 24,
    PrintResultSpcRsp = 25,
    PrintWinRsp = 26,
    PrintLostRsp = 27,
    PrintDrawRsp = 28,
    CleanupRsp = 29,
}

impl MessageType {
    fn from_i32(n: i32) -> Option<Self> {
        use MessageType::*;
        Some(match n {
            0 => Login, 1 => LoginRsp,
            2 => PlayersList, 3 => PlayersListRsp,
            4 => GamesList, 5 => GamesListRsp,
            6 => CreateGame, 7 => CreateGameRsp,
            8 => ConnectGame, 9 => ConnectGameRsp,
            10 => ConnectSpectator, 11 => ConnectSpectatorRsp,
            12 => BackToMenu, 13 => BackToMenuRsp,
            14 => PrintBoard, 15 => PrintBoardRsp,
            16 => CheckTurn, 17 => CheckTurnRsp,
            18 => MakeMove, 19 => MakeMoveRsp,
            20 => LeaveMessage, 21 => LeaveMessageRsp,
            22 => Leave, 23 => LeaveRsp,
            24 => PrintBoardSpcRsp,
            25 => PrintResultSpcRsp,
            26 => PrintWinRsp,
            27 => PrintLostRsp,
            28 => PrintDrawRsp,
            29 => CleanupRsp,
            _ => return None,
        })
    }
}

/// Flat error enum shared by every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    None = 0,
    NickExists = 1,
    InternalServerError = 2,
    WrongBoardSize = 3,
    WrongGameId = 4,
    TooManyPlayers = 5,
    TooManySpectators = 6,
    WrongTurn = 7,
    WrongMove = 8,
    WaitOpponent = 9,
}

impl ErrorCode {
    fn from_i32(n: i32) -> Option<Self> {
        use ErrorCode::*;
        Some(match n {
            0 => None,
            1 => NickExists,
            2 => InternalServerError,
            3 => WrongBoardSize,
            4 => WrongGameId,
            5 => TooManyPlayers,
            6 => TooManySpectators,
            7 => WrongTurn,
            8 => WrongMove,
            9 => WaitOpponent,
            _ => return Option::None,
        })
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A decoded request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub msg_type: MessageType,
    pub payload: Vec<u8>,
}

/// A decoded response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub msg_type: MessageType,
    pub error: ErrorCode,
    pub payload: Vec<u8>,
}

fn pad_frame(mut bytes: Vec<u8>) -> [u8; FRAME_SIZE] {
    bytes.resize(FRAME_SIZE, 0);
    let mut frame = [0u8; FRAME_SIZE];
    frame.copy_from_slice(&bytes);
    frame
}

impl Request {
    pub fn new(msg_type: MessageType, payload: impl Into<Vec<u8>>) -> Self {
        Self { msg_type, payload: payload.into() }
    }

    /// Encodes into a zero-padded [`FRAME_SIZE`]-byte frame. Truncates the
    /// payload beyond [`MAX_REQ_PAYLOAD`] rather than producing an
    /// oversized frame.
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut payload = self.payload.clone();
        payload.truncate(MAX_REQ_PAYLOAD);
        let mut bytes = format!("{}{}", self.msg_type as i32, MSG_DELIM).into_bytes();
        bytes.extend_from_slice(&payload);
        pad_frame(bytes)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, &'static str> {
        let text = frame_as_text(frame)?;
        let mut parts = text.splitn(2, MSG_DELIM);
        let type_tok = parts.next().ok_or("malformed frame")?;
        let rest = parts.next().unwrap_or("");
        let type_num: i32 = type_tok.trim().parse().map_err(|_| "malformed type")?;
        let msg_type = MessageType::from_i32(type_num).ok_or("unknown message type")?;
        Ok(Request { msg_type, payload: rest.as_bytes().to_vec() })
    }
}

impl Response {
    pub fn new(msg_type: MessageType, error: ErrorCode, payload: impl Into<Vec<u8>>) -> Self {
        Self { msg_type, error, payload: payload.into() }
    }

    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut payload = self.payload.clone();
        payload.truncate(MAX_RSP_PAYLOAD);
        let mut bytes = format!(
            "{}{}{}{}",
            self.msg_type as i32, MSG_DELIM, self.error as i32, MSG_DELIM
        )
        .into_bytes();
        bytes.extend_from_slice(&payload);
        pad_frame(bytes)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, &'static str> {
        let text = frame_as_text(frame)?;
        let mut parts = text.splitn(3, MSG_DELIM);
        let type_tok = parts.next().ok_or("malformed frame")?;
        let error_tok = parts.next().ok_or("malformed frame")?;
        let rest = parts.next().unwrap_or("");
        let type_num: i32 = type_tok.trim().parse().map_err(|_| "malformed type")?;
        let error_num: i32 = error_tok.trim().parse().map_err(|_| "malformed error")?;
        let msg_type = MessageType::from_i32(type_num).ok_or("unknown message type")?;
        let error = ErrorCode::from_i32(error_num).ok_or("unknown error code")?;
        Ok(Response { msg_type, error, payload: rest.as_bytes().to_vec() })
    }
}

/// Frames are UTF-8-safe ASCII text padded with NUL bytes; strip the
/// padding and view the rest as text without copying past the first NUL,
/// distinguishing zero padding from legitimate ASCII content.
fn frame_as_text(frame: &[u8]) -> Result<&str, &'static str> {
    let end = frame.iter().position(|&b| b == 0).unwrap_or(frame.len());
    std::str::from_utf8(&frame[..end]).map_err(|_| "non-UTF8 frame")
}

/// Splits a `#`-delimited payload into its records, dropping the trailing
/// empty record a trailing `#` produces.
pub fn split_records(payload: &str) -> Vec<&str> {
    payload
        .split(PAYLOAD_DELIM)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Splits one `;`-delimited record into fields.
pub fn split_fields(record: &str) -> Vec<&str> {
    record.split(INNER_DELIM).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let req = Request::new(MessageType::Login, "alice".as_bytes().to_vec());
        let frame = req.encode();
        assert_eq!(frame.len(), FRAME_SIZE);
        let decoded = Request::decode(&frame).unwrap();
        assert_eq!(decoded.msg_type, MessageType::Login);
        assert_eq!(decoded.payload, b"alice");
    }

    #[test]
    fn response_round_trips_with_error() {
        let rsp = Response::new(MessageType::LoginRsp, ErrorCode::NickExists, Vec::new());
        let frame = rsp.encode();
        let decoded = Response::decode(&frame).unwrap();
        assert_eq!(decoded.msg_type, MessageType::LoginRsp);
        assert_eq!(decoded.error, ErrorCode::NickExists);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn payload_with_inner_delimiters_round_trips() {
        let payload = "1;4;5;alice#".as_bytes().to_vec();
        let rsp = Response::new(MessageType::GamesListRsp, ErrorCode::None, payload.clone());
        let decoded = Response::decode(&rsp.encode()).unwrap();
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let mut bytes = format!("999{MSG_DELIM}").into_bytes();
        bytes.resize(FRAME_SIZE, 0);
        assert!(Request::decode(&bytes).is_err());
    }

    #[test]
    fn records_and_fields_split_correctly() {
        let payload = "1;4;5;alice#2;8;3;bob;carol#";
        let records = split_records(payload);
        assert_eq!(records, vec!["1;4;5;alice", "2;8;3;bob;carol"]);
        assert_eq!(split_fields(records[1]), vec!["2", "8", "3", "bob", "carol"]);
    }
}

//! # Status
//!
//! FTP reply codes

use std::fmt;

/// A three-digit FTP reply code.
///
/// Codes without a named variant are kept as `Unknown`, so the conversion from `u32` never loses information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    // 1xx: Positive Preliminary Reply
    RestartMarker,
    ReadyMinute,
    AlreadyOpen,
    AboutToSend,
    // 2xx: Positive Completion Reply
    CommandOk,
    CommandNotImplemented,
    System,
    Directory,
    File,
    Help,
    Name,
    Ready,
    Closing,
    DataConnectionOpen,
    ClosingDataConnection,
    PassiveMode,
    LoggedIn,
    RequestedFileActionOk,
    PathCreated,
    // 3xx: Positive intermediate Reply
    NeedPassword,
    LoginNeedAccount,
    RequestFilePending,
    // 4xx: Transient Negative Completion Reply
    NotAvailable,
    CannotOpenDataConnection,
    TransferAborted,
    RequestFileActionIgnored,
    ActionAborted,
    RequestedActionNotTaken,
    // 5xx: Permanent Negative Completion Reply
    BadCommand,
    BadArguments,
    NotImplemented,
    BadSequence,
    NotImplementedParameter,
    NotLoggedIn,
    FileUnavailable,
    ExceededStorage,
    BadFilename,
    /// Any other code
    Unknown(u32),
}

impl Status {
    /// Numeric value of the reply code
    pub fn code(&self) -> u32 {
        match self {
            Status::RestartMarker => 110,
            Status::ReadyMinute => 120,
            Status::AlreadyOpen => 125,
            Status::AboutToSend => 150,
            Status::CommandOk => 200,
            Status::CommandNotImplemented => 202,
            Status::System => 211,
            Status::Directory => 212,
            Status::File => 213,
            Status::Help => 214,
            Status::Name => 215,
            Status::Ready => 220,
            Status::Closing => 221,
            Status::DataConnectionOpen => 225,
            Status::ClosingDataConnection => 226,
            Status::PassiveMode => 227,
            Status::LoggedIn => 230,
            Status::RequestedFileActionOk => 250,
            Status::PathCreated => 257,
            Status::NeedPassword => 331,
            Status::LoginNeedAccount => 332,
            Status::RequestFilePending => 350,
            Status::NotAvailable => 421,
            Status::CannotOpenDataConnection => 425,
            Status::TransferAborted => 426,
            Status::RequestFileActionIgnored => 450,
            Status::ActionAborted => 451,
            Status::RequestedActionNotTaken => 452,
            Status::BadCommand => 500,
            Status::BadArguments => 501,
            Status::NotImplemented => 502,
            Status::BadSequence => 503,
            Status::NotImplementedParameter => 504,
            Status::NotLoggedIn => 530,
            Status::FileUnavailable => 550,
            Status::ExceededStorage => 552,
            Status::BadFilename => 553,
            Status::Unknown(code) => *code,
        }
    }

    /// 1xx replies announce that another reply will follow
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code())
    }

    /// 2xx replies
    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code())
    }
}

impl From<u32> for Status {
    fn from(code: u32) -> Self {
        match code {
            110 => Status::RestartMarker,
            120 => Status::ReadyMinute,
            125 => Status::AlreadyOpen,
            150 => Status::AboutToSend,
            200 => Status::CommandOk,
            202 => Status::CommandNotImplemented,
            211 => Status::System,
            212 => Status::Directory,
            213 => Status::File,
            214 => Status::Help,
            215 => Status::Name,
            220 => Status::Ready,
            221 => Status::Closing,
            225 => Status::DataConnectionOpen,
            226 => Status::ClosingDataConnection,
            227 => Status::PassiveMode,
            230 => Status::LoggedIn,
            250 => Status::RequestedFileActionOk,
            257 => Status::PathCreated,
            331 => Status::NeedPassword,
            332 => Status::LoginNeedAccount,
            350 => Status::RequestFilePending,
            421 => Status::NotAvailable,
            425 => Status::CannotOpenDataConnection,
            426 => Status::TransferAborted,
            450 => Status::RequestFileActionIgnored,
            451 => Status::ActionAborted,
            452 => Status::RequestedActionNotTaken,
            500 => Status::BadCommand,
            501 => Status::BadArguments,
            502 => Status::NotImplemented,
            503 => Status::BadSequence,
            504 => Status::NotImplementedParameter,
            530 => Status::NotLoggedIn,
            550 => Status::FileUnavailable,
            552 => Status::ExceededStorage,
            553 => Status::BadFilename,
            other => Status::Unknown(other),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
